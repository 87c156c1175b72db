//! The slice of the widget tree this crate needs: something that renders to
//! an HTML fragment. Layout and form widgets live outside this crate and only
//! have to implement [`Widget`].

use crate::html::escape_text;
use crate::html::render_element;

pub trait Widget: Send + Sync {
    fn render(&self) -> String;

    /// Name recorded in logs and in the registry.
    fn widget_type(&self) -> &'static str {
        "Widget"
    }
}

pub type BoxedWidget = Box<dyn Widget>;

impl<W: Widget + ?Sized> Widget for Box<W> {
    fn render(&self) -> String {
        (**self).render()
    }

    fn widget_type(&self) -> &'static str {
        (**self).widget_type()
    }
}

/// Escaped text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text(String);

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn boxed(text: impl Into<String>) -> BoxedWidget {
        Box::new(Self::new(text))
    }
}

impl Widget for Text {
    fn render(&self) -> String {
        escape_text(&self.0)
    }

    fn widget_type(&self) -> &'static str {
        "Text"
    }
}

/// Pre-rendered markup inserted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHtml(String);

impl RawHtml {
    pub fn new(html: impl Into<String>) -> Self {
        Self(html.into())
    }
}

impl Widget for RawHtml {
    fn render(&self) -> String {
        self.0.clone()
    }

    fn widget_type(&self) -> &'static str {
        "RawHtml"
    }
}

/// Generic element with attributes and child widgets.
pub struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<BoxedWidget>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn child(
        mut self,
        child: impl Widget + 'static,
    ) -> Self {
        self.children.push(Box::new(child));
        self
    }

    pub fn boxed(self) -> BoxedWidget {
        Box::new(self)
    }
}

impl Widget for Element {
    fn render(&self) -> String {
        let content: String = self.children.iter().map(|c| c.render()).collect();
        render_element(
            &self.tag,
            self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            &content,
            false,
        )
    }

    fn widget_type(&self) -> &'static str {
        "Element"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_renders_children_in_order() {
        let el = Element::new("p")
            .attr("class", "count")
            .child(Text::new("a<"))
            .child(RawHtml::new("<br>"));
        assert_eq!(el.render(), "<p class=\"count\">a&lt;<br></p>");
        assert_eq!(el.widget_type(), "Element");
    }

    #[test]
    fn test_boxed_widget_delegates() {
        let w: BoxedWidget = Text::boxed("x");
        assert_eq!(w.render(), "x");
        assert_eq!(w.widget_type(), "Text");
    }
}
