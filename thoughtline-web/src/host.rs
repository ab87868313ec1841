//! The browser side of [`Host`].
//!
//! Every callback the page delivers (timers, listeners, script events, fetch
//! completions) goes back into the engine through [`dispatch`], which holds
//! only a weak handle so a torn-down page never keeps the engine alive.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gloo_timers::callback::{Interval, Timeout};
use shared::engine::remote::fetch_count;
use shared::engine::{EmbedEvent, FetchTicket, Host, MountRequest, NoticeLevel, Placeholder, SignalKind, Task};
use shared::models::{CountCue, DomSignal, EmbedFailure, SubmissionTrigger, ThreadId};
use tracing::{debug, trace, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{
    Document, Element, HtmlElement, HtmlIFrameElement, ScrollBehavior, ScrollIntoViewOptions, ScrollLogicalPosition,
    Window,
};

use crate::api::DiscussionsClient;
use crate::app::{EngineHandle, dispatch};
use crate::config::CountLabels;
use crate::listeners::{DomListener, DomObserver, clicked_submit, message_parts, pressed_submit};

const PLACEHOLDER_CLASS: &str = "giscus-placeholder";
const WIDGET_FRAME: &str = "iframe.giscus-frame";
const CUE_ATTRIBUTE: &str = "data-count-cue";
const CUE_DURATION_MS: u32 = 600;
const NOTICE_DURATION_MS: u32 = 3_000;

/// Cancellation handle for anything [`WebHost`] starts.
pub enum WebGuard {
    Timeout(#[allow(dead_code)] Timeout),
    Interval(#[allow(dead_code)] Interval),
    Listener(DomListener),
    Observer(DomObserver),
    Group(Vec<WebGuard>),
}

impl std::fmt::Debug for WebGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(_) => f.write_str("Timeout"),
            Self::Interval(_) => f.write_str("Interval"),
            Self::Listener(listener) => listener.fmt(f),
            Self::Observer(observer) => observer.fmt(f),
            Self::Group(guards) => f.debug_list().entries(guards).finish(),
        }
    }
}

/// The injected widget script of one thread and its load/error listeners.
#[derive(Debug)]
struct MountedScript {
    _load: Option<DomListener>,
    _error: Option<DomListener>,
}

pub struct WebHost {
    window: Window,
    document: Document,
    engine: EngineHandle,
    remote: Option<Rc<DiscussionsClient>>,
    labels: CountLabels,
    widget_origin: String,
    ready_selector: String,
    count_selectors: Vec<String>,
    scripts: HashMap<ThreadId, MountedScript>,
    cue_timers: HashMap<ThreadId, Timeout>,
}

impl std::fmt::Debug for WebHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebHost")
            .field("remote", &self.remote.is_some())
            .field("mounted", &self.scripts.len())
            .finish_non_exhaustive()
    }
}

impl WebHost {
    pub fn new(
        window: Window,
        document: Document,
        engine: EngineHandle,
        remote: Option<DiscussionsClient>,
        labels: CountLabels,
        config: &shared::config::Config,
    ) -> Self {
        Self {
            window,
            document,
            engine,
            remote: remote.map(Rc::new),
            labels,
            widget_origin: config.widget_origin(),
            ready_selector: config.embed.ready_selector.clone(),
            count_selectors: config.embed.count_selectors.clone(),
            scripts: HashMap::new(),
            cue_timers: HashMap::new(),
        }
    }

    /// `#comments-{id}`: the collapsible panel.
    fn container(&self, thread: &ThreadId) -> Option<HtmlElement> {
        self.document
            .get_element_by_id(&format!("comments-{thread}"))
            .and_then(|element| element.dyn_into::<HtmlElement>().ok())
    }

    /// `#giscus-{id}`: the region the widget is mounted into.
    fn region(&self, thread: &ThreadId) -> Option<Element> {
        self.document.get_element_by_id(&format!("giscus-{thread}"))
    }

    fn query_all(&self, selector: &str) -> Vec<Element> {
        let Ok(nodes) = self.document.query_selector_all(selector) else {
            return Vec::new();
        };
        (0..nodes.length())
            .filter_map(|index| nodes.item(index))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect()
    }

    fn count_spans(&self, thread: &ThreadId) -> Vec<Element> {
        self.query_all(&format!(".comment-count[data-thought-id=\"{thread}\"]"))
    }

    fn triggers(&self, thread: &ThreadId) -> Vec<Element> {
        self.query_all(&format!(".comment-btn[data-thought-id=\"{thread}\"]"))
    }

    fn remove_placeholders(region: &Element) {
        if let Ok(nodes) = region.query_selector_all(&format!(".{PLACEHOLDER_CLASS}")) {
            for index in 0..nodes.length() {
                if let Some(element) = nodes.item(index).and_then(|node| node.dyn_into::<Element>().ok()) {
                    element.remove();
                }
            }
        }
    }

    fn placeholder_element(&self, thread: &ThreadId, placeholder: Placeholder) -> Option<Element> {
        let element = self.document.create_element("div").ok()?;
        let (class, text) = match placeholder {
            Placeholder::Loading => ("giscus-loading", "加载评论中...".to_string()),
            Placeholder::Retrying { retry, max_retries } => (
                "giscus-loading",
                format!("评论加载失败，正在重试 ({retry}/{max_retries})..."),
            ),
            Placeholder::Failed { failure } => ("giscus-error", failure_text(failure).to_string()),
        };
        element.set_class_name(&format!("{PLACEHOLDER_CLASS} {class}"));
        element.set_text_content(Some(&text));

        if matches!(placeholder, Placeholder::Failed { .. }) {
            for (class, label) in [("comment-retry-btn", "重试"), ("close-comments-btn", "关闭")] {
                let button = self.document.create_element("button").ok()?;
                button.set_class_name(class);
                button.set_attribute("type", "button").ok()?;
                button.set_attribute("data-thought-id", thread.as_str()).ok()?;
                button.set_text_content(Some(label));
                element.append_child(&button).ok()?;
            }
        }
        Some(element)
    }

    fn submission_listener(
        &self,
        region: &Element,
        event: &'static str,
        classify: fn(&web_sys::Event) -> Option<SubmissionTrigger>,
        thread: &ThreadId,
    ) -> Option<WebGuard> {
        let engine = self.engine.clone();
        let thread = thread.clone();
        DomListener::attach(region, event, true, move |event| {
            if let Some(trigger) = classify(&event) {
                let thread = thread.clone();
                dispatch(&engine, move |subsystem| {
                    subsystem.on_dom_signal(&thread, DomSignal::Submission(trigger));
                });
            }
        })
        .map(WebGuard::Listener)
    }

    fn watch_region(&self, thread: &ThreadId) -> Option<WebGuard> {
        let region = self.region(thread)?;
        let engine = self.engine.clone();
        let watched = thread.clone();
        let observer = DomObserver::observe(&region, move || {
            let thread = watched.clone();
            dispatch(&engine, move |subsystem| {
                subsystem.on_dom_signal(&thread, DomSignal::Mutated);
            });
        })?;

        let mut guards = vec![WebGuard::Observer(observer)];
        guards.extend(self.submission_listener(
            &region,
            "submit",
            |_| Some(SubmissionTrigger::FormSubmit),
            thread,
        ));
        guards.extend(self.submission_listener(&region, "click", clicked_submit, thread));
        guards.extend(self.submission_listener(&region, "keydown", pressed_submit, thread));
        Some(WebGuard::Group(guards))
    }

    fn listen_messages(&self, thread: &ThreadId) -> Option<WebGuard> {
        let engine = self.engine.clone();
        let thread = thread.clone();
        DomListener::attach(&self.window, "message", false, move |event| {
            let Some((origin, raw)) = message_parts(&event) else {
                return;
            };
            let thread = thread.clone();
            dispatch(&engine, move |subsystem| {
                subsystem.on_frame_message(&thread, &origin, &raw);
            });
        })
        .map(WebGuard::Listener)
    }

    fn script_listener(
        &self,
        script: &Element,
        name: &'static str,
        request: &MountRequest,
        event: EmbedEvent,
    ) -> Option<DomListener> {
        let engine = self.engine.clone();
        let thread = request.thread.clone();
        let attempt = request.attempt;
        DomListener::attach(script, name, false, move |_| {
            let thread = thread.clone();
            dispatch(&engine, move |subsystem| {
                subsystem.on_widget_event(&thread, attempt, event);
            });
        })
    }
}

/// The widget's `setConfig` message for a theme switch.
fn theme_message(theme: &str) -> String {
    serde_json::json!({ "giscus": { "setConfig": { "theme": theme } } }).to_string()
}

fn failure_text(failure: EmbedFailure) -> &'static str {
    match failure {
        EmbedFailure::Timeout => "评论加载超时，请重试",
        EmbedFailure::LoadError => "评论加载失败，请重试",
        EmbedFailure::NotReady => "评论区未能完成初始化，请重试",
    }
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

impl Host for WebHost {
    type Guard = WebGuard;

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn page_path(&self) -> String {
        self.window
            .location()
            .pathname()
            .unwrap_or_else(|_| "/".to_string())
    }

    fn theme(&self) -> String {
        let explicit = self
            .document
            .document_element()
            .and_then(|root| root.get_attribute("data-theme"))
            .filter(|theme| !theme.is_empty());
        if let Some(theme) = explicit {
            return if theme == "dark" { "dark" } else { "light" }.to_string();
        }
        let prefers_dark = self
            .window
            .match_media("(prefers-color-scheme: dark)")
            .ok()
            .flatten()
            .is_some_and(|query| query.matches());
        if prefers_dark { "dark" } else { "light" }.to_string()
    }

    fn set_timeout(&mut self, delay: Duration, task: Task) -> WebGuard {
        let engine = self.engine.clone();
        WebGuard::Timeout(Timeout::new(millis(delay), move || {
            dispatch(&engine, move |subsystem| subsystem.on_task(task));
        }))
    }

    fn set_interval(&mut self, period: Duration, task: Task) -> WebGuard {
        let engine = self.engine.clone();
        WebGuard::Interval(Interval::new(millis(period), move || {
            let task = task.clone();
            dispatch(&engine, move |subsystem| subsystem.on_task(task));
        }))
    }

    fn listen(&mut self, thread: &ThreadId, kind: SignalKind) -> Option<WebGuard> {
        match kind {
            SignalKind::Message => self.listen_messages(thread),
            SignalKind::Mutation => self.watch_region(thread),
            SignalKind::Interval => None,
        }
    }

    fn has_container(&self, thread: &ThreadId) -> bool {
        self.container(thread).is_some() && self.region(thread).is_some()
    }

    fn set_container_visible(&mut self, thread: &ThreadId, visible: bool) {
        if let Some(container) = self.container(thread) {
            let display = if visible { "block" } else { "none" };
            let _ = container.style().set_property("display", display);
        }
    }

    fn set_trigger_active(&mut self, thread: &ThreadId, active: bool) {
        for trigger in self.triggers(thread) {
            let _ = trigger.class_list().toggle_with_force("active", active);
        }
    }

    fn scroll_into_view(&mut self, thread: &ThreadId) {
        if let Some(container) = self.container(thread) {
            let options = ScrollIntoViewOptions::new();
            options.set_behavior(ScrollBehavior::Smooth);
            options.set_block(ScrollLogicalPosition::Center);
            container.scroll_into_view_with_scroll_into_view_options(&options);
        }
    }

    fn mount_widget(&mut self, request: &MountRequest) -> bool {
        let Some(region) = self.region(&request.thread) else {
            return false;
        };
        let Ok(script) = self.document.create_element("script") else {
            return false;
        };
        for (name, value) in &request.attributes {
            if script.set_attribute(name, value).is_err() {
                warn!(thread = %request.thread, attribute = %name, "cannot set widget attribute");
                return false;
            }
        }
        let _ = script.set_attribute("async", "");

        let mounted = MountedScript {
            _load: self.script_listener(&script, "load", request, EmbedEvent::Loaded),
            _error: self.script_listener(&script, "error", request, EmbedEvent::LoadFailed),
        };
        if region.append_child(&script).is_err() {
            return false;
        }
        self.scripts.insert(request.thread.clone(), mounted);
        debug!(thread = %request.thread, attempt = request.attempt, "widget script injected");
        true
    }

    fn show_placeholder(&mut self, thread: &ThreadId, placeholder: Option<Placeholder>) {
        let Some(region) = self.region(thread) else {
            return;
        };
        Self::remove_placeholders(&region);
        if let Some(element) = placeholder.and_then(|placeholder| self.placeholder_element(thread, placeholder)) {
            let _ = region.prepend_with_node_1(&element);
        }
    }

    fn set_widget_theme(&mut self, thread: &ThreadId, theme: &str) -> bool {
        let frame = self
            .region(thread)
            .and_then(|region| region.query_selector(WIDGET_FRAME).ok().flatten())
            .and_then(|frame| frame.dyn_into::<HtmlIFrameElement>().ok())
            .and_then(|frame| frame.content_window());
        let Some(frame) = frame else {
            return false;
        };
        let Ok(message) = js_sys::JSON::parse(&theme_message(theme)) else {
            return false;
        };
        match frame.post_message(&message, &self.widget_origin) {
            Ok(()) => true,
            Err(error) => {
                warn!(thread = %thread, ?error, "cannot post theme to widget");
                false
            }
        }
    }

    fn clear_widget(&mut self, thread: &ThreadId) {
        self.scripts.remove(thread);
        if let Some(region) = self.region(thread) {
            region.set_inner_html("");
        }
    }

    fn has_content_marker(&self, thread: &ThreadId) -> bool {
        self.region(thread)
            .and_then(|region| region.query_selector(&self.ready_selector).ok().flatten())
            .is_some()
    }

    fn scrape_count_text(&self, thread: &ThreadId) -> Option<String> {
        let region = self.region(thread)?;
        self.count_selectors.iter().find_map(|selector| {
            region
                .query_selector(selector)
                .ok()
                .flatten()
                .and_then(|element| element.text_content())
        })
    }

    fn render_count(&mut self, thread: &ThreadId, value: u64, cue: Option<CountCue>) {
        let label = self.labels.render(value);
        for span in self.count_spans(thread) {
            span.set_text_content(Some(&label));
            if let Some(cue) = cue {
                let _ = span.set_attribute(CUE_ATTRIBUTE, cue.as_ref());
            }
        }
        if cue.is_some() {
            let document = self.document.clone();
            let selector = format!(".comment-count[data-thought-id=\"{thread}\"]");
            let timer = Timeout::new(CUE_DURATION_MS, move || {
                if let Ok(nodes) = document.query_selector_all(&selector) {
                    for index in 0..nodes.length() {
                        if let Some(span) = nodes.item(index).and_then(|node| node.dyn_into::<Element>().ok()) {
                            let _ = span.remove_attribute(CUE_ATTRIBUTE);
                        }
                    }
                }
            });
            self.cue_timers.insert(thread.clone(), timer);
        }
        trace!(thread = %thread, value, ?cue, "count rendered");
    }

    fn request_remote_count(&mut self, ticket: FetchTicket) {
        let Some(client) = self.remote.clone() else {
            debug!(thread = %ticket.thread, "remote count disabled");
            return;
        };
        let engine = self.engine.clone();
        spawn_local(async move {
            let result = fetch_count(&*client, &ticket).await;
            dispatch(&engine, move |subsystem| {
                subsystem.on_remote_result(ticket.id, result);
            });
        });
    }

    fn notify(&mut self, level: NoticeLevel, message: &str) {
        let Some(body) = self.document.body() else {
            return;
        };
        let Ok(notice) = self.document.create_element("div") else {
            return;
        };
        notice.set_class_name(&format!("notification notification-{level}"));
        notice.set_text_content(Some(message));
        if body.append_child(&notice).is_ok() {
            Timeout::new(NOTICE_DURATION_MS, move || notice.remove()).forget();
        }
    }
}
