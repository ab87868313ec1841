//! DOM listeners that detach themselves when dropped.

use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use web_sys::{Element, Event, EventTarget, KeyboardEvent, MessageEvent, MutationObserver, MutationObserverInit, Node};

use shared::models::SubmissionTrigger;

/// An event listener attached with [`DomListener::attach`].
pub struct DomListener {
    target: EventTarget,
    event: &'static str,
    capture: bool,
    callback: Closure<dyn FnMut(Event)>,
}

impl std::fmt::Debug for DomListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomListener")
            .field("event", &self.event)
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}

impl DomListener {
    /// Adds `handler` for `event` on `target`. `None` if the browser refused.
    pub fn attach<F>(target: &EventTarget, event: &'static str, capture: bool, handler: F) -> Option<Self>
    where
        F: FnMut(Event) + 'static,
    {
        let callback = Closure::<dyn FnMut(Event)>::wrap(Box::new(handler));
        target
            .add_event_listener_with_callback_and_bool(event, callback.as_ref().unchecked_ref(), capture)
            .ok()?;
        Some(Self {
            target: target.clone(),
            event,
            capture,
            callback,
        })
    }
}

impl Drop for DomListener {
    fn drop(&mut self) {
        let _ = self.target.remove_event_listener_with_callback_and_bool(
            self.event,
            self.callback.as_ref().unchecked_ref(),
            self.capture,
        );
    }
}

/// A `MutationObserver`, disconnected on drop.
pub struct DomObserver {
    observer: MutationObserver,
    _callback: Closure<dyn FnMut(js_sys::Array, MutationObserver)>,
}

impl std::fmt::Debug for DomObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomObserver").finish_non_exhaustive()
    }
}

impl DomObserver {
    /// Calls `handler` whenever the children of `target` or its descendants change.
    pub fn observe<F>(target: &Node, handler: F) -> Option<Self>
    where
        F: FnMut() + 'static,
    {
        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_subtree(true);
        Self::start(target, &options, handler)
    }

    /// Calls `handler` whenever the attribute `name` of `target` changes.
    pub fn observe_attribute<F>(target: &Node, name: &str, handler: F) -> Option<Self>
    where
        F: FnMut() + 'static,
    {
        let options = MutationObserverInit::new();
        options.set_attributes(true);
        options.set_attribute_filter(&js_sys::Array::of1(&name.into()));
        Self::start(target, &options, handler)
    }

    fn start<F>(target: &Node, options: &MutationObserverInit, mut handler: F) -> Option<Self>
    where
        F: FnMut() + 'static,
    {
        let callback = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::wrap(Box::new(
            move |_records: js_sys::Array, _observer: MutationObserver| handler(),
        ));
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref()).ok()?;
        observer.observe_with_options(target, options).ok()?;
        Some(Self {
            observer,
            _callback: callback,
        })
    }
}

impl Drop for DomObserver {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

/// Selectors of controls that post a comment.
const SUBMIT_CONTROLS: &str = "button[type=submit], .gsc-comment-box-buttons button, .comment-submit";

/// Submission trigger represented by a click, if it hit a submit control.
pub fn clicked_submit(event: &Event) -> Option<SubmissionTrigger> {
    event_element(event)?
        .closest(SUBMIT_CONTROLS)
        .ok()
        .flatten()
        .map(|_| SubmissionTrigger::SubmitControl)
}

/// Submission trigger represented by a key press: Ctrl/Cmd+Enter.
pub fn pressed_submit(event: &Event) -> Option<SubmissionTrigger> {
    let key = event.dyn_ref::<KeyboardEvent>()?;
    (key.key() == "Enter" && (key.ctrl_key() || key.meta_key()))
        .then_some(SubmissionTrigger::KeyboardShortcut)
}

pub fn is_escape(event: &Event) -> bool {
    event
        .dyn_ref::<KeyboardEvent>()
        .is_some_and(|key| key.key() == "Escape")
}

/// Origin and serialized payload of a cross-frame message.
pub fn message_parts(event: &Event) -> Option<(String, String)> {
    let message = event.dyn_ref::<MessageEvent>()?;
    let data = message.data();
    let raw = match data.as_string() {
        Some(text) => text,
        None => js_sys::JSON::stringify(&data).ok()?.as_string()?,
    };
    Some((message.origin(), raw))
}

/// The element an event was dispatched to.
pub fn event_element(event: &Event) -> Option<Element> {
    event.target()?.dyn_into::<Element>().ok()
}

/// Nearest ancestor of the event target (itself included) matching `selector`.
pub fn closest(event: &Event, selector: &str) -> Option<Element> {
    event_element(event)?.closest(selector).ok().flatten()
}
