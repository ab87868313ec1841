//! Page bootstrap.
//!
//! Builds the [`CommentSubsystem`] for the current page, paints the cached
//! counts and wires the page-level listeners: trigger clicks, Escape, page
//! unload and changes of the page's color theme.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use anyhow::{Context, anyhow};
use gloo_timers::callback::Timeout;
use once_cell::unsync::OnceCell;
use shared::engine::CommentSubsystem;
use shared::models::ThreadId;
use tracing::{debug, error, info, warn};
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Event, Window};

use crate::api::DiscussionsClient;
use crate::config::WebConfig;
use crate::host::WebHost;
use crate::listeners::{DomListener, DomObserver, closest, is_escape};
use crate::logging::initialize_tracing;
use crate::storage::LocalStorageBackend;

pub type Engine = CommentSubsystem<WebHost>;

/// Weak reference held by every callback that reaches back into the engine.
pub type EngineHandle = Weak<RefCell<Engine>>;

const CARD_SELECTOR: &str = ".thought-card[data-thought-id]";
const OPEN_TRIGGER: &str = ".comment-btn[data-thought-id]";
const CLOSE_TRIGGER: &str = ".close-comments-btn";
const RETRY_TRIGGER: &str = ".comment-retry-btn";
const THEME_ATTRIBUTE: &str = "data-theme";
const DARK_SCHEME_QUERY: &str = "(prefers-color-scheme: dark)";

thread_local! {
    static PAGE: OnceCell<Page> = OnceCell::new();
}

/// Everything kept alive for the lifetime of the page.
struct Page {
    _engine: Rc<RefCell<Engine>>,
    _listeners: Vec<DomListener>,
    _theme_observer: Option<DomObserver>,
}

/// Runs `action` against the engine, if it still exists.
///
/// Callbacks never nest in the browser event loop, but if the engine is
/// already borrowed the action is deferred to the next task rather than
/// dropped.
pub fn dispatch<F>(handle: &EngineHandle, action: F)
where
    F: FnOnce(&mut Engine) + 'static,
{
    let Some(engine) = handle.upgrade() else {
        return;
    };
    if let Ok(mut engine) = engine.try_borrow_mut() {
        action(&mut engine);
        return;
    }
    debug!("engine busy, deferring callback");
    let handle = handle.clone();
    Timeout::new(0, move || dispatch(&handle, action)).forget();
}

/// Starts the comment panels of the current page.
pub fn start() -> anyhow::Result<()> {
    let window = web_sys::window().ok_or_else(|| anyhow!("no window"))?;
    let document = window.document().ok_or_else(|| anyhow!("no document"))?;

    let config = match WebConfig::from_page(&window) {
        Ok(config) => config,
        Err(config_error) => {
            initialize_tracing("info");
            error!(error = %config_error, "comments disabled: invalid configuration");
            return Err(config_error).context("loading page configuration");
        }
    };
    let level = initialize_tracing(&config.core.logging.level);
    info!(level = %level, repo = %config.core.embed.repo, "starting comments");

    let remote = if config.core.remote.enabled {
        Some(DiscussionsClient::new(&config.core).context("building discussions client")?)
    } else {
        None
    };

    let engine = Rc::new_cyclic(|handle: &EngineHandle| {
        let host = WebHost::new(
            window.clone(),
            document.clone(),
            handle.clone(),
            remote,
            config.labels.clone(),
            &config.core,
        );
        RefCell::new(CommentSubsystem::new(
            config.core.clone(),
            host,
            Box::new(LocalStorageBackend::new()),
        ))
    });

    let painted = engine.borrow_mut().paint(card_threads(&document));
    let mut listeners = page_listeners(&window, &document, &Rc::downgrade(&engine));
    let (theme_observer, scheme_listener) = theme_watchers(&window, &document, &Rc::downgrade(&engine));
    listeners.extend(scheme_listener);
    info!(
        painted,
        listeners = listeners.len(),
        theme_observed = theme_observer.is_some(),
        "comments ready"
    );

    PAGE.with(|page| {
        page.set(Page {
            _engine: engine,
            _listeners: listeners,
            _theme_observer: theme_observer,
        })
        .map_err(|_| anyhow!("comments already started"))
    })
}

fn card_threads(document: &Document) -> Vec<ThreadId> {
    let Ok(cards) = document.query_selector_all(CARD_SELECTOR) else {
        return Vec::new();
    };
    (0..cards.length())
        .filter_map(|index| cards.item(index))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .filter_map(|card| card.get_attribute("data-thought-id"))
        .filter(|id| !id.is_empty())
        .map(ThreadId::new)
        .collect()
}

fn thread_of(element: &Element) -> Option<ThreadId> {
    element
        .get_attribute("data-thought-id")
        .filter(|id| !id.is_empty())
        .map(ThreadId::new)
}

fn on_click(engine: &EngineHandle, event: &Event) {
    if let Some(trigger) = closest(event, OPEN_TRIGGER) {
        event.prevent_default();
        if let Some(thread) = thread_of(&trigger) {
            dispatch(engine, move |subsystem| {
                subsystem.open(&thread);
            });
        }
    } else if let Some(trigger) = closest(event, RETRY_TRIGGER) {
        if let Some(thread) = thread_of(&trigger) {
            dispatch(engine, move |subsystem| {
                subsystem.retry(&thread);
            });
        }
    } else if let Some(trigger) = closest(event, CLOSE_TRIGGER) {
        let thread = thread_of(&trigger);
        dispatch(engine, move |subsystem| {
            match thread {
                Some(thread) => subsystem.close(&thread),
                None => subsystem.close_current(),
            };
        });
    }
}

fn page_listeners(window: &Window, document: &Document, engine: &EngineHandle) -> Vec<DomListener> {
    let mut listeners = Vec::new();

    let clicks = engine.clone();
    listeners.extend(DomListener::attach(document, "click", false, move |event| {
        on_click(&clicks, &event);
    }));

    let keys = engine.clone();
    listeners.extend(DomListener::attach(document, "keydown", false, move |event| {
        if is_escape(&event) {
            dispatch(&keys, |subsystem| {
                subsystem.close_current();
            });
        }
    }));

    let unload = engine.clone();
    listeners.extend(DomListener::attach(window, "beforeunload", false, move |_| {
        dispatch(&unload, Engine::teardown);
    }));

    if listeners.len() < 3 {
        warn!(attached = listeners.len(), "some page listeners could not be attached");
    }
    listeners
}

/// Forwards theme changes to the engine: the root element's `data-theme`
/// attribute and the system color scheme.
fn theme_watchers(
    window: &Window,
    document: &Document,
    engine: &EngineHandle,
) -> (Option<DomObserver>, Option<DomListener>) {
    let observer = document.document_element().and_then(|root| {
        let engine = engine.clone();
        DomObserver::observe_attribute(&root, THEME_ATTRIBUTE, move || {
            dispatch(&engine, |subsystem| {
                subsystem.on_theme_change();
            });
        })
    });

    let listener = window
        .match_media(DARK_SCHEME_QUERY)
        .ok()
        .flatten()
        .and_then(|query| {
            let engine = engine.clone();
            DomListener::attach(&query, "change", false, move |_| {
                dispatch(&engine, |subsystem| {
                    subsystem.on_theme_change();
                });
            })
        });

    if observer.is_none() || listener.is_none() {
        warn!(
            attribute = observer.is_some(),
            scheme = listener.is_some(),
            "theme changes are only partly followed"
        );
    }
    (observer, listener)
}
