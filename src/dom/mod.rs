//! Typed page snapshot.
//!
//! A `DomSnapshot` is the structured result of scanning the live document:
//! one `DomElement` per element in document order, with its attributes,
//! text, rendered box and effective style. Honeypot classification,
//! selector discovery and scoring are pure functions over a snapshot, so
//! they run against synthetic documents as easily as against a browser.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Elements rendered further than this outside the viewport count as hidden.
pub const OFFSCREEN_MARGIN: f64 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

/// Effective (inherited) presentation of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomElement {
    /// Stable node index within the page; also the `ElementHandle` value.
    pub index: usize,
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Whitespace-collapsed text content, descendants included.
    #[serde(default)]
    pub text: String,
    /// Text of the element's own text nodes only.
    #[serde(default)]
    pub own_text: String,
    #[serde(default)]
    pub rect: Rect,
    #[serde(default)]
    pub style: ComputedStyle,
    #[serde(default)]
    pub parent: Option<usize>,
    /// 1-based position among the parent's element children.
    #[serde(default = "first_child")]
    pub nth_child: usize,
}

fn first_child() -> usize {
    1
}

impl DomElement {
    pub fn new(index: usize, tag: &str) -> Self {
        Self {
            index,
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            own_text: String::new(),
            rect: Rect::default(),
            style: ComputedStyle::default(),
            parent: None,
            nth_child: 1,
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self.own_text = text.to_string();
        self
    }

    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    pub fn with_parent(mut self, parent: usize, nth_child: usize) -> Self {
        self.parent = Some(parent);
        self.nth_child = nth_child;
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|v| !v.trim().is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.attr("name").filter(|v| !v.trim().is_empty())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    pub fn class_attr(&self) -> &str {
        self.attr("class").unwrap_or_default()
    }

    pub fn href(&self) -> Option<&str> {
        self.attr("href").map(str::trim).filter(|v| !v.is_empty())
    }

    /// Zero rendered area, hidden through style or attributes, or parked
    /// far outside the viewport.
    pub fn is_effectively_invisible(&self, viewport: &Viewport) -> bool {
        let style = &self.style;
        self.rect.area() <= 0.0
            || style.display == "none"
            || style.visibility == "hidden"
            || style.visibility == "collapse"
            || style.opacity < 0.01
            || self.attributes.contains_key("hidden")
            || self.attr("aria-hidden").is_some_and(|v| v.eq_ignore_ascii_case("true"))
            || self.is_offscreen(viewport)
    }

    pub fn is_offscreen(&self, viewport: &Viewport) -> bool {
        let r = &self.rect;
        r.x + r.width < -OFFSCREEN_MARGIN
            || r.y + r.height < -OFFSCREEN_MARGIN
            || r.x > viewport.width + OFFSCREEN_MARGIN
    }

    pub fn is_visible(&self, viewport: &Viewport) -> bool {
        !self.is_effectively_invisible(viewport)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub elements: Vec<DomElement>,
}

impl DomSnapshot {
    /// Element with document-order `index`. `elements` is kept in document
    /// order, so this is a direct hit on untouched pages and a binary search
    /// once removed elements have left gaps.
    pub fn element(&self, index: usize) -> Option<&DomElement> {
        match self.elements.get(index) {
            Some(element) if element.index == index => Some(element),
            _ => self
                .elements
                .binary_search_by_key(&index, |e| e.index)
                .ok()
                .map(|position| &self.elements[position]),
        }
    }

    /// Ancestors of `index`, nearest first.
    pub fn ancestors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let mut current = index;
        let mut steps = 0;
        std::iter::from_fn(move || {
            // A malformed snapshot could loop; no real tree is deeper than it is long.
            if steps >= self.elements.len() {
                return None;
            }
            steps += 1;
            let parent = self.element(current)?.parent?;
            current = parent;
            Some(parent)
        })
    }

    pub fn visible(&self) -> impl Iterator<Item = &DomElement> {
        self.elements.iter().filter(|e| e.is_visible(&self.viewport))
    }

    /// Visible text of the page: own text of every visible element, in
    /// document order.
    pub fn visible_text(&self) -> String {
        self.visible()
            .map(|e| e.own_text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn count_tag(&self, tag: &str) -> usize {
        self.elements.iter().filter(|e| e.tag == tag).count()
    }

    /// CSS selector for `element`: id, then name attribute, then classes,
    /// then a positional `parent > tag:nth-child(n)` path.
    pub fn synthesize_selector(&self, element: &DomElement) -> String {
        self.selector_for(element, 0)
    }

    fn selector_for(&self, element: &DomElement, depth: usize) -> String {
        if let Some(id) = element.id() {
            return id_selector(id);
        }
        if let Some(name) = element.name() {
            return format!("{}[name=\"{}\"]", element.tag, escape_attr(name));
        }
        let classes: Vec<&str> = element.classes().filter(|c| is_css_ident(c)).collect();
        if !classes.is_empty() {
            return format!("{}.{}", element.tag, classes.join("."));
        }

        let positional = format!("{}:nth-child({})", element.tag, element.nth_child);
        match element.parent.and_then(|p| self.element(p)) {
            Some(parent) if depth < 4 && parent.tag != "html" => {
                format!("{} > {}", self.selector_for(parent, depth + 1), positional)
            }
            _ => positional,
        }
    }
}

pub fn id_selector(id: &str) -> String {
    if is_css_ident(id) {
        format!("#{id}")
    } else {
        format!("[id=\"{}\"]", escape_attr(id))
    }
}

pub fn escape_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn is_css_ident(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        Some('-') => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible(index: usize, tag: &str) -> DomElement {
        DomElement::new(index, tag).with_rect(Rect::new(0.0, 100.0, 200.0, 20.0))
    }

    #[test]
    fn invisibility_covers_every_hiding_technique() {
        let viewport = Viewport::default();
        assert!(visible(0, "a").is_visible(&viewport));

        let cases = vec![
            visible(1, "a").with_rect(Rect::new(0.0, 0.0, 0.0, 10.0)),
            visible(2, "a").with_attr("hidden", ""),
            visible(3, "a").with_attr("aria-hidden", "true"),
            visible(4, "a").with_rect(Rect::new(-9999.0, 10.0, 100.0, 20.0)),
            visible(5, "a").with_rect(Rect::new(10.0, -5000.0, 100.0, 20.0)),
        ];
        for element in cases {
            assert!(element.is_effectively_invisible(&viewport), "{element:?}");
        }

        let mut faded = visible(6, "a");
        faded.style.opacity = 0.0;
        assert!(faded.is_effectively_invisible(&viewport));

        let mut collapsed = visible(7, "a");
        collapsed.style.visibility = "hidden".to_string();
        assert!(collapsed.is_effectively_invisible(&viewport));
    }

    #[test]
    fn below_the_fold_is_not_offscreen() {
        let element = visible(0, "p").with_rect(Rect::new(0.0, 4000.0, 100.0, 20.0));
        assert!(element.is_visible(&Viewport::default()));
    }

    #[test]
    fn selector_synthesis_prefers_id_then_name_then_class() {
        let snapshot = DomSnapshot::default();
        let by_id = visible(0, "input").with_attr("id", "email").with_attr("name", "e");
        let by_name = visible(1, "input").with_attr("name", "email");
        let by_class = visible(2, "a").with_attr("class", "trap link");
        let weird_id = visible(3, "div").with_attr("id", "1:x");

        assert_eq!(snapshot.synthesize_selector(&by_id), "#email");
        assert_eq!(snapshot.synthesize_selector(&by_name), "input[name=\"email\"]");
        assert_eq!(snapshot.synthesize_selector(&by_class), "a.trap.link");
        assert_eq!(snapshot.synthesize_selector(&weird_id), "[id=\"1:x\"]");
    }

    #[test]
    fn positional_selector_walks_up_to_an_anchor() {
        let snapshot = DomSnapshot {
            elements: vec![
                visible(0, "div").with_attr("id", "bio"),
                visible(1, "span").with_parent(0, 3),
            ],
            ..DomSnapshot::default()
        };
        let span = snapshot.element(1).unwrap();
        assert_eq!(snapshot.synthesize_selector(span), "#bio > span:nth-child(3)");
    }

    #[test]
    fn lookup_survives_gaps_left_by_removed_elements() {
        let snapshot = DomSnapshot {
            elements: vec![
                visible(0, "body"),
                visible(2, "div").with_parent(0, 2),
                visible(5, "a").with_parent(2, 1),
            ],
            ..DomSnapshot::default()
        };
        assert_eq!(snapshot.element(2).map(|e| e.tag.as_str()), Some("div"));
        assert_eq!(snapshot.element(5).map(|e| e.tag.as_str()), Some("a"));
        assert!(snapshot.element(1).is_none());
        assert_eq!(snapshot.ancestors(5).collect::<Vec<_>>(), vec![2, 0]);
    }

    #[test]
    fn visible_text_skips_hidden_elements() {
        let snapshot = DomSnapshot {
            elements: vec![
                visible(0, "p").with_text("shown"),
                visible(1, "p").with_text("hidden").with_attr("hidden", ""),
            ],
            ..DomSnapshot::default()
        };
        assert_eq!(snapshot.visible_text(), "shown");
    }
}
