//! `PageDriver` over fetched HTML.
//!
//! Parses the document with `scraper` and approximates what a browser would
//! report for each element: inline styles are resolved with inheritance
//! (`display`, `visibility`, `opacity`), explicit sizes and offsets are
//! honored, and everything else is laid out as a vertical flow of 24px
//! lines. That is enough for honeypot detection and scoring to behave the
//! same way they do against a real browser for the common hiding tricks.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::dom::{ComputedStyle, DomElement, DomSnapshot, Rect, Viewport, collapse_whitespace};
use crate::traits::{ElementHandle, PageDriver};

const LINE_HEIGHT: f64 = 24.0;
const DEFAULT_IMAGE_SIZE: f64 = 100.0;

const UNRENDERED_TAGS: &[&str] = &[
    "head", "script", "style", "meta", "link", "title", "noscript", "template", "base",
];
const REPLACED_TAGS: &[&str] = &["img", "input", "button", "textarea", "select", "iframe", "video"];

pub struct StaticPage {
    client: Option<Client>,
    url: String,
    html: String,
    viewport: Viewport,
    removed: HashSet<usize>,
    clicked: Vec<usize>,
}

impl StaticPage {
    /// Build a page from markup already in hand; link clicks only move the URL.
    pub fn from_html(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            client: None,
            url: url.into(),
            html: html.into(),
            viewport: Viewport::default(),
            removed: HashSet::new(),
            clicked: Vec::new(),
        }
    }

    /// Fetch `url` with `client` and build a page from the response body.
    pub async fn fetch(client: Client, url: &str) -> Result<Self> {
        let html = fetch_html(&client, url).await?;
        let mut page = Self::from_html(url, html);
        page.client = Some(client);
        Ok(page)
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Elements clicked so far, in order.
    pub fn clicked(&self) -> &[usize] {
        &self.clicked
    }

    fn parse_selector(selector: &str) -> Result<Selector> {
        Selector::parse(selector).map_err(|e| anyhow!("invalid selector `{selector}`: {e:?}"))
    }

    fn matches(&self, selector: &str) -> Result<Vec<usize>> {
        let selector = Self::parse_selector(selector)?;
        let document = Html::parse_document(&self.html);

        Ok(with_index(&document, |lookup| {
            document
                .select(&selector)
                .filter_map(|el| lookup(el))
                .filter(|index| !self.removed.contains(index))
                .collect()
        }))
    }

    fn build_snapshot(&self) -> DomSnapshot {
        let document = Html::parse_document(&self.html);

        let title = Selector::parse("title")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default();

        let mut elements = with_index(&document, |lookup| {
            let mut layout = Layout {
                lookup,
                removed: &self.removed,
                viewport: self.viewport,
                cursor_y: 0.0,
                elements: Vec::new(),
            };
            layout.walk(document.root_element(), None, 1, &Inherited::root());
            layout.elements
        });
        elements.sort_by_key(|e| e.index);

        DomSnapshot {
            url: self.url.clone(),
            title,
            viewport: self.viewport,
            elements,
        }
    }

    fn subtree_indices(&self, root: usize) -> Vec<usize> {
        let document = Html::parse_document(&self.html);
        with_index(&document, |lookup| {
            document
                .root_element()
                .descendants()
                .filter_map(ElementRef::wrap)
                .find(|el| lookup(*el) == Some(root))
                .map(|el| {
                    el.descendants()
                        .filter_map(ElementRef::wrap)
                        .filter_map(|d| lookup(d))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    async fn load(&mut self, url: &str) -> Result<()> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| anyhow!("static page for {} has no HTTP client", self.url))?;
        self.html = fetch_html(&client, url).await?;
        self.url = url.to_string();
        self.removed.clear();
        Ok(())
    }
}

async fn fetch_html(client: &Client, url: &str) -> Result<String> {
    info!("Fetching {}", url);
    let response = client.get(url).send().await.with_context(|| format!("GET {url}"))?;

    if !response.status().is_success() {
        bail!("Failed to fetch page {}: {}", url, response.status());
    }

    Ok(response.text().await?)
}

/// Maps an element of `document` to its document-order index.
type Lookup<'a> = &'a dyn for<'x> Fn(ElementRef<'x>) -> Option<usize>;

fn with_index<R>(document: &Html, f: impl FnOnce(Lookup<'_>) -> R) -> R {
    let index_of: HashMap<_, usize> = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .enumerate()
        .map(|(index, el)| (el.id(), index))
        .collect();
    f(&|el: ElementRef<'_>| index_of.get(&el.id()).copied())
}

#[async_trait]
impl PageDriver for StaticPage {
    async fn navigate_to(&mut self, url: &str) -> Result<()> {
        self.load(url).await
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>> {
        Ok(self.matches(selector)?.first().copied().map(ElementHandle))
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        // Static markup never changes by itself, so one lookup is final.
        Ok(!self.matches(selector)?.is_empty())
    }

    async fn describe(&self, element: ElementHandle) -> Result<DomElement> {
        if self.removed.contains(&element.0) {
            bail!("element {} was removed from the page", element.0);
        }
        self.build_snapshot()
            .elements
            .into_iter()
            .find(|e| e.index == element.0)
            .ok_or_else(|| anyhow!("element {} not found", element.0))
    }

    async fn snapshot(&self) -> Result<DomSnapshot> {
        Ok(self.build_snapshot())
    }

    async fn remove_matching(&mut self, selector: &str) -> Result<usize> {
        let matched = self.matches(selector)?;
        let mut removed = 0;
        for index in matched {
            if self.removed.contains(&index) {
                continue;
            }
            for node in self.subtree_indices(index) {
                self.removed.insert(node);
            }
            removed += 1;
        }
        debug!(selector, removed, "Removed elements");
        Ok(removed)
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()> {
        let target = self.describe(element).await?;
        self.clicked.push(element.0);

        let Some(href) = target.href().filter(|_| target.tag == "a") else {
            return Ok(());
        };
        let base = url::Url::parse(&self.url).with_context(|| format!("bad page URL {}", self.url))?;

        if let Some(fragment) = href.strip_prefix('#') {
            let mut next = base;
            next.set_fragment(Some(fragment));
            self.url = next.to_string();
            return Ok(());
        }

        let next = base.join(href).with_context(|| format!("bad link {href}"))?;
        if self.client.is_some() {
            self.load(next.as_str()).await
        } else {
            self.url = next.to_string();
            Ok(())
        }
    }
}

#[derive(Clone)]
struct Inherited {
    hidden: bool,
    visibility: String,
    opacity: f64,
    dx: f64,
    dy: f64,
}

impl Inherited {
    fn root() -> Self {
        Self {
            hidden: false,
            visibility: "visible".to_string(),
            opacity: 1.0,
            dx: 0.0,
            dy: 0.0,
        }
    }
}

struct Layout<'a> {
    lookup: Lookup<'a>,
    removed: &'a HashSet<usize>,
    viewport: Viewport,
    cursor_y: f64,
    elements: Vec<DomElement>,
}

impl Layout<'_> {
    /// Lays out `el` and its subtree; returns the subtree's text.
    fn walk(&mut self, el: ElementRef<'_>, parent: Option<usize>, nth_child: usize, inherited: &Inherited) -> String {
        let Some(index) = (self.lookup)(el) else {
            return String::new();
        };
        if self.removed.contains(&index) {
            return String::new();
        }

        let value = el.value();
        let tag = value.name().to_ascii_lowercase();
        let style = inline_style(value.attr("style").unwrap_or_default());

        let hidden = inherited.hidden
            || UNRENDERED_TAGS.contains(&tag.as_str())
            || value.attr("hidden").is_some()
            || style.get("display").is_some_and(|d| d == "none")
            || (tag == "input" && value.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")));
        let visibility = style
            .get("visibility")
            .cloned()
            .unwrap_or_else(|| inherited.visibility.clone());
        let opacity = inherited.opacity * style.get("opacity").and_then(|o| o.parse::<f64>().ok()).unwrap_or(1.0);

        let positioned = style
            .get("position")
            .is_some_and(|p| p == "absolute" || p == "fixed");
        let dx = inherited.dx + style.get("left").and_then(|v| px(v)).unwrap_or(0.0);
        let dy = inherited.dy + style.get("top").and_then(|v| px(v)).unwrap_or(0.0);

        let saved_cursor = self.cursor_y;
        let start_y = self.cursor_y;

        let child_inherited = Inherited {
            hidden,
            visibility: visibility.clone(),
            opacity,
            dx,
            dy,
        };

        let mut own_text = String::new();
        let mut text = String::new();
        let mut nth = 0;
        for child in el.children() {
            if let Some(t) = child.value().as_text() {
                own_text.push_str(t);
                own_text.push(' ');
                if !matches!(tag.as_str(), "script" | "style" | "noscript" | "template") {
                    text.push_str(t);
                    text.push(' ');
                }
            } else if let Some(child_el) = ElementRef::wrap(child) {
                // Positions count detached siblings so `:nth-child` stays in
                // step with how selectors are matched against the markup.
                nth += 1;
                let child_index = (self.lookup)(child_el);
                if child_index.is_some_and(|i| self.removed.contains(&i)) {
                    continue;
                }
                let child_text = self.walk(child_el, Some(index), nth, &child_inherited);
                if !child_text.is_empty() {
                    text.push_str(&child_text);
                    text.push(' ');
                }
            }
        }
        let own_text = collapse_whitespace(&own_text);
        let text = collapse_whitespace(&text);

        let explicit_width = style
            .get("width")
            .and_then(|v| px(v))
            .or_else(|| value.attr("width").and_then(px));
        let explicit_height = style
            .get("height")
            .and_then(|v| px(v))
            .or_else(|| value.attr("height").and_then(px));
        let replaced = REPLACED_TAGS.contains(&tag.as_str());

        let rect = if hidden {
            self.cursor_y = saved_cursor;
            Rect::default()
        } else {
            let line = if replaced || !own_text.is_empty() {
                let default = if tag == "img" { DEFAULT_IMAGE_SIZE } else { LINE_HEIGHT };
                let line = explicit_height.unwrap_or(default);
                self.cursor_y += line;
                line
            } else {
                0.0
            };
            let height = explicit_height.unwrap_or((self.cursor_y - start_y).max(line));
            if explicit_height.is_some() {
                self.cursor_y = start_y + height;
            }
            let width = explicit_width.unwrap_or(if tag == "img" {
                DEFAULT_IMAGE_SIZE
            } else {
                self.viewport.width
            });
            if positioned {
                self.cursor_y = saved_cursor;
            }
            Rect::new(dx, start_y + dy, width, height)
        };

        let mut element = DomElement::new(index, &tag);
        element.attributes = value
            .attrs()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();
        element.text = text.clone();
        element.own_text = own_text;
        element.rect = rect;
        element.style = ComputedStyle {
            display: if hidden {
                "none".to_string()
            } else {
                style.get("display").cloned().unwrap_or_else(|| "block".to_string())
            },
            visibility,
            opacity,
        };
        element.parent = parent;
        element.nth_child = nth_child;
        self.elements.push(element);

        text
    }
}

fn inline_style(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|declaration| {
            let (property, value) = declaration.split_once(':')?;
            let value = value.trim().trim_end_matches("!important").trim();
            Some((property.trim().to_ascii_lowercase(), value.to_ascii_lowercase()))
        })
        .filter(|(property, value)| !property.is_empty() && !value.is_empty())
        .collect()
}

fn px(value: &str) -> Option<f64> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value).trim();
    number.parse::<f64>().ok()
}
