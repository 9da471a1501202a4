// src/testing/assertions.rs

//! # Live Assertions
//!
//! Behavioural checks against a running instance of a mutated project. The
//! [`AssertionClient`] keeps a "current page" and evaluates selectors on its
//! parsed markup; how pages are fetched is behind the [`PageDriver`] seam.
//! [`HttpPageDriver`] fetches rendered pages over HTTP from the dev server.

use crate::core::syntax::markup::{Element, MarkupDocument};
use crate::testing::definition::AssertionStep;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A failed behavioural check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Assertion on '{selector}' failed: expected {expected}, got {actual}")]
pub struct AssertionError {
    pub selector: String,
    pub expected: String,
    pub actual: String,
}

impl AssertionError {
    fn new(selector: &str, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            selector: selector.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// A fetched page: the path it ended up at (after redirects) and its markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPage {
    pub path: String,
    pub body: String,
}

/// Fetches pages of the instance under test.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Loads `path` (absolute, starting with `/`).
    async fn load(&self, path: &str) -> anyhow::Result<LoadedPage>;
}

/// Loads pages from a server over HTTP, following redirects.
#[derive(Debug, Clone)]
pub struct HttpPageDriver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPageDriver {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PageDriver for HttpPageDriver {
    async fn load(&self, path: &str) -> anyhow::Result<LoadedPage> {
        let url = format!("{}{}", self.base_url, path);
        log::trace!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        let final_path = response.url().path().to_string();
        let status = response.status();
        let body = response.text().await?;
        if status.is_server_error() {
            anyhow::bail!("GET {url} answered {status}");
        }
        Ok(LoadedPage {
            path: final_path,
            body,
        })
    }
}

struct CurrentPage {
    path: String,
    document: MarkupDocument,
}

/// Runs assertion steps against pages served through a [`PageDriver`].
pub struct AssertionClient<D: PageDriver> {
    driver: D,
    current: Option<CurrentPage>,
}

impl<D: PageDriver> std::fmt::Debug for AssertionClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionClient")
            .field("path", &self.current.as_ref().map(|p| p.path.as_str()))
            .finish_non_exhaustive()
    }
}

impl<D: PageDriver> AssertionClient<D> {
    pub fn new(driver: D) -> Self {
        Self { driver, current: None }
    }

    /// Path of the current page, if one was loaded.
    pub fn current_path(&self) -> Option<&str> {
        self.current.as_ref().map(|page| page.path.as_str())
    }

    /// Navigates to `path`.
    pub async fn visit(&mut self, path: &str) -> Result<(), AssertionError> {
        let page = self
            .driver
            .load(path)
            .await
            .map_err(|e| AssertionError::new(path, "the page to load", format!("{e:#}")))?;
        let document = MarkupDocument::parse_html(&page.body)
            .map_err(|e| AssertionError::new(path, "parsable markup", e.to_string()))?;
        self.current = Some(CurrentPage {
            path: page.path,
            document,
        });
        Ok(())
    }

    /// An element matching `selector` exists on the current page.
    pub fn element_exists(&self, selector: &str) -> Result<(), AssertionError> {
        self.find(selector).map(|_| ())
    }

    /// The first element matching `selector` has `property` equal to `expected`.
    ///
    /// `textContent` / `innerText` compare the trimmed text content; any other
    /// property is read from the attribute of the same name.
    pub fn expect_property(&self, selector: &str, property: &str, expected: &str) -> Result<(), AssertionError> {
        let element = self.find(selector)?;
        let actual = match property {
            "textContent" | "innerText" => Some(element.text_content().trim().to_string()),
            _ => element.attr(property).map(str::to_string),
        };
        match actual {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(AssertionError::new(
                selector,
                format!("{property} = '{expected}'"),
                format!("{property} = '{actual}'"),
            )),
            None => Err(AssertionError::new(
                selector,
                format!("{property} = '{expected}'"),
                format!("no '{property}' property"),
            )),
        }
    }

    /// Follows the link matching `selector`, then checks the resulting path
    /// when `path` is given.
    pub async fn click(&mut self, selector: &str, path: Option<&str>) -> Result<(), AssertionError> {
        let target = {
            let element = self.find(selector)?;
            let href = element
                .attr("href")
                .ok_or_else(|| AssertionError::new(selector, "a link", format!("<{}> without href", element.name)))?;
            resolve_href(self.current_path().unwrap_or("/"), href)
        };
        self.visit(&target).await?;
        if let Some(expected) = path {
            self.expect_url_path(expected)?;
        }
        Ok(())
    }

    /// The current page's path is `path`.
    pub fn expect_url_path(&self, path: &str) -> Result<(), AssertionError> {
        let actual = self.current_path().unwrap_or_default();
        if actual == path {
            Ok(())
        } else {
            Err(AssertionError::new("location", format!("path '{path}'"), format!("path '{actual}'")))
        }
    }

    /// Runs one declarative step.
    pub async fn run_step(&mut self, step: &AssertionStep) -> Result<(), AssertionError> {
        match step {
            AssertionStep::Visit { path } => self.visit(path).await,
            AssertionStep::ElementExists { selector } => self.element_exists(selector),
            AssertionStep::ExpectProperty {
                selector,
                property,
                expected,
            } => self.expect_property(selector, property, expected),
            AssertionStep::Click { selector, path } => self.click(selector, path.as_deref()).await,
            AssertionStep::ExpectUrlPath { path } => self.expect_url_path(path),
        }
    }

    /// Loads the root page and runs `steps` in order, stopping at the first failure.
    pub async fn run_steps(&mut self, steps: &[AssertionStep]) -> Result<(), AssertionError> {
        self.visit("/").await?;
        for step in steps {
            self.run_step(step).await?;
        }
        Ok(())
    }

    fn find(&self, selector: &str) -> Result<&Element, AssertionError> {
        let page = self
            .current
            .as_ref()
            .ok_or_else(|| AssertionError::new(selector, "a loaded page", "no page"))?;
        match page.document.select_first(selector) {
            Ok(Some(element)) => Ok(element),
            Ok(None) => Err(AssertionError::new(selector, "a matching element", "none")),
            Err(e) => Err(AssertionError::new(selector, "a valid selector", e.to_string())),
        }
    }
}

/// Resolves an anchor's `href` against the current path. Only same-origin
/// paths are followed; query strings and fragments are dropped.
fn resolve_href(current: &str, href: &str) -> String {
    let href = href
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    if let Some(rest) = href.strip_prefix("http://").or_else(|| href.strip_prefix("https://")) {
        return rest
            .find('/')
            .and_then(|i| rest.get(i..))
            .unwrap_or("/")
            .to_string();
    }
    if href.starts_with('/') {
        return href.to_string();
    }
    if href.is_empty() {
        return current.to_string();
    }
    let base = current.rsplit_once('/').map_or("", |(dir, _)| dir);
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for part in href.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Serves fixed pages from memory.
    struct StaticDriver {
        pages: HashMap<&'static str, &'static str>,
    }

    #[async_trait]
    impl PageDriver for StaticDriver {
        async fn load(&self, path: &str) -> anyhow::Result<LoadedPage> {
            let body = self
                .pages
                .get(path)
                .ok_or_else(|| anyhow::anyhow!("404 for {path}"))?;
            Ok(LoadedPage {
                path: path.to_string(),
                body: body.to_string(),
            })
        }
    }

    fn client(pages: &[(&'static str, &'static str)]) -> AssertionClient<StaticDriver> {
        AssertionClient::new(StaticDriver {
            pages: pages.iter().copied().collect(),
        })
    }

    const HOME: &str = r#"<!doctype html>
<html><body>
  <h1 class="title">Welcome</h1>
  <nav><a id="about" href="about">About</a><span class="plain">x</span></nav>
  <input name="email" value="a@b.c">
</body></html>"#;

    #[tokio::test]
    async fn test_exists_and_property() {
        let mut client = client(&[("/", HOME)]);
        client.visit("/").await.unwrap();
        client.element_exists("h1.title").unwrap();
        client.expect_property("h1", "textContent", "Welcome").unwrap();
        client.expect_property("input[name=email]", "value", "a@b.c").unwrap();

        let err = client.element_exists("[data-test-id]").unwrap_err();
        assert_eq!(err.selector, "[data-test-id]");
        assert_eq!(err.actual, "none");

        let err = client.expect_property("h1", "textContent", "Bye").unwrap_err();
        assert_eq!(err.expected, "textContent = 'Bye'");
        assert_eq!(err.actual, "textContent = 'Welcome'");
    }

    #[tokio::test]
    async fn test_click_follows_links() {
        let mut client = client(&[("/", HOME), ("/about", "<main>About us</main>")]);
        client
            .run_steps(&[
                AssertionStep::click("#about", Some("/about")),
                AssertionStep::expect_property("main", "innerText", "About us"),
            ])
            .await
            .unwrap();
        assert_eq!(client.current_path(), Some("/about"));

        client.visit("/").await.unwrap();
        let err = client.click("span.plain", None).await.unwrap_err();
        assert_eq!(err.expected, "a link");
    }

    #[tokio::test]
    async fn test_load_failures_are_assertion_errors() {
        let mut client = client(&[]);
        let err = client.visit("/missing").await.unwrap_err();
        assert_eq!(err.selector, "/missing");
        assert!(err.actual.contains("404"));
        assert!(client.expect_url_path("/missing").is_err());
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("/", "about"), "/about");
        assert_eq!(resolve_href("/blog/post", "../demo?x=1"), "/demo");
        assert_eq!(resolve_href("/a/b", "/c#top"), "/c");
        assert_eq!(resolve_href("/", "http://localhost:5173/demo/x"), "/demo/x");
        assert_eq!(resolve_href("/here", ""), "/here");
    }
}
