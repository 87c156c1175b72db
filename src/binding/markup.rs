use serde_json::Value;

use crate::constants::ATTR_LAST_UPDATED;
use crate::constants::ATTR_LISTENER_ID;
use crate::constants::ATTR_NOTIFIER_ID;
use crate::constants::ATTR_VALUE;
use crate::constants::ATTR_VALUE_TYPE;
use crate::constants::ATTR_WIDGET_ID;
use crate::constants::LISTENER_CONTAINER_CLASS;
use crate::html::render_element;

pub(super) struct Container<'a> {
    pub notifier_id: &'a str,
    pub listener_id: &'a str,
    pub widget_id: &'a str,
    pub value_type: &'a str,
    pub value: &'a Value,
    pub last_updated: u64,
}

impl Container<'_> {
    /// Container element wrapping `content`, followed by the script that
    /// queues this listener for the browser runtime.
    pub(super) fn render(
        &self,
        content: &str,
    ) -> String {
        let value = self.value.to_string();
        let last_updated = self.last_updated.to_string();
        let mut html = render_element(
            "div",
            [
                ("class", LISTENER_CONTAINER_CLASS),
                (ATTR_NOTIFIER_ID, self.notifier_id),
                (ATTR_LISTENER_ID, self.listener_id),
                (ATTR_WIDGET_ID, self.widget_id),
                (ATTR_VALUE_TYPE, self.value_type),
                (ATTR_VALUE, value.as_str()),
                (ATTR_LAST_UPDATED, last_updated.as_str()),
            ],
            content,
            false,
        );
        html.push_str(&bootstrap_script(self.notifier_id, self.listener_id));
        html
    }
}

/// `window.NotifierSync` starts out as a plain array; the runtime script
/// drains it on load and replaces it with an object exposing `push`.
pub(super) fn bootstrap_script(
    notifier_id: &str,
    listener_id: &str,
) -> String {
    let args = script_json(&Value::from(vec![notifier_id, listener_id]));
    render_element(
        "script",
        std::iter::empty::<(&str, &str)>(),
        &format!("(window.NotifierSync=window.NotifierSync||[]).push({args});"),
        false,
    )
}

/// JSON safe to inline inside a `<script>` element.
fn script_json(value: &Value) -> String {
    value.to_string().replace("</", "<\\/").replace("<!--", "<\\!--")
}
