//! Minimal HTML element renderer and the panic-safe render wrapper.
//!
//! Widgets produce markup through [`render_element`]; bindings wrap builder
//! output with [`safe_render`] so a panicking widget degrades into a
//! diagnostic fragment instead of unwinding through the request task.

use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;

use tracing::warn;

use crate::constants::ATTR_ERROR_KIND;
use crate::constants::ERROR_FRAGMENT_CLASS;
use crate::utils::async_task::panic_message;
use crate::widget::Widget;

/// What [`safe_render`] emits when the widget panics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorStrategy {
    /// Visible inline error box carrying the panic message
    #[default]
    Diagnostic,
    /// Render nothing
    Silent,
    /// Render the given markup instead
    Fallback(String),
}

/// Escapes text content.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes a double-quoted attribute value.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders `<tag attr="value"...>content</tag>`.
///
/// Attribute values are escaped, `content` is inserted verbatim. With
/// `self_closing` the content is ignored and `<tag ... />` is produced.
pub fn render_element<I, K, V>(
    tag: &str,
    attrs: I,
    content: &str,
    self_closing: bool,
) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = String::with_capacity(content.len() + 64);
    out.push('<');
    out.push_str(tag);
    for (k, v) in attrs {
        out.push(' ');
        out.push_str(k.as_ref());
        out.push_str("=\"");
        out.push_str(&escape_attr(v.as_ref()));
        out.push('"');
    }
    if self_closing {
        out.push_str(" />");
        return out;
    }
    out.push('>');
    out.push_str(content);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
    out
}

/// Inline diagnostic box shown in place of content that failed to render.
pub fn error_fragment(
    kind: &str,
    message: &str,
) -> String {
    render_element(
        "div",
        [
            ("class", ERROR_FRAGMENT_CLASS),
            ("role", "alert"),
            (ATTR_ERROR_KIND, kind),
        ],
        &escape_text(message),
        false,
    )
}

/// Renders `widget`, containing any panic according to `strategy`.
pub fn safe_render(
    widget: &dyn Widget,
    strategy: &ErrorStrategy,
) -> String {
    match try_render(widget) {
        Ok(html) => html,
        Err(message) => {
            warn!(widget_type = widget.widget_type(), "widget render panicked: {}", message);
            failure_fragment(strategy, "render-panic", &message)
        }
    }
}

/// Markup shown in place of content that failed, according to `strategy`.
pub fn failure_fragment(
    strategy: &ErrorStrategy,
    kind: &str,
    message: &str,
) -> String {
    match strategy {
        ErrorStrategy::Diagnostic => error_fragment(kind, message),
        ErrorStrategy::Silent => String::new(),
        ErrorStrategy::Fallback(html) => html.clone(),
    }
}

/// Renders `widget`, returning the panic message if it panicked.
pub(crate) fn try_render(widget: &dyn Widget) -> std::result::Result<String, String> {
    catch_unwind(AssertUnwindSafe(|| widget.render())).map_err(|payload| panic_message(payload.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::RawHtml;
    use crate::widget::Text;

    struct Exploding;

    impl Widget for Exploding {
        fn render(&self) -> String {
            panic!("widget exploded")
        }
    }

    #[test]
    fn test_render_element_escapes_attributes_only() {
        let html = render_element("span", [("title", "a\"b<c>")], "<b>x</b>", false);
        assert_eq!(html, "<span title=\"a&quot;b&lt;c&gt;\"><b>x</b></span>");
    }

    #[test]
    fn test_render_element_self_closing_ignores_content() {
        let html = render_element("input", [("value", "1")], "ignored", true);
        assert_eq!(html, "<input value=\"1\" />");
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a & <b>"), "a &amp; &lt;b&gt;");
        assert_eq!(escape_text("plain"), "plain");
    }

    #[test]
    fn test_error_fragment_carries_kind() {
        let html = error_fragment("missing-builder", "no <builder>");
        assert!(html.contains("data-error-kind=\"missing-builder\""));
        assert!(html.contains("no &lt;builder&gt;"));
        assert!(html.contains("class=\"vn-error\""));
    }

    #[test]
    fn test_safe_render_passes_through_healthy_widget() {
        let html = safe_render(&Text::new("hi"), &ErrorStrategy::Diagnostic);
        assert_eq!(html, "hi");
        let html = safe_render(&RawHtml::new("<i>x</i>"), &ErrorStrategy::Silent);
        assert_eq!(html, "<i>x</i>");
    }

    #[test]
    fn test_safe_render_contains_panics_per_strategy() {
        let diagnostic = safe_render(&Exploding, &ErrorStrategy::Diagnostic);
        assert!(diagnostic.contains("widget exploded"));
        assert!(diagnostic.contains("render-panic"));

        assert_eq!(safe_render(&Exploding, &ErrorStrategy::Silent), "");

        let fallback = safe_render(&Exploding, &ErrorStrategy::Fallback("<p>-</p>".into()));
        assert_eq!(fallback, "<p>-</p>");
    }
}
