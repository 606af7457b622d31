//! Web search and browser tools: Brave/DuckDuckGo search, HTTP-fetch-based
//! page rendering, and HTML-to-text extraction.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::fs::truncate_byte_boundary;
use crate::{
    Attachment, AttachmentType, ContextHandle, SecurityLevel, Tool, ToolMetadata, ToolOutput,
    ToolParam, ToolSpec,
};

fn get_str<'a>(args: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Searches the web: Brave Search API when a key is configured, the
/// DuckDuckGo Instant Answers API (keyless, no local retry budget)
/// otherwise.
pub struct WebSearchTool {
    pub brave_api_key: Option<String>,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "web_search".to_string(),
            description: "Search the web (Brave API when configured, DuckDuckGo otherwise)."
                .to_string(),
            params: vec![
                ToolParam {
                    name: "query".to_string(),
                    description: "Search query string".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "count".to_string(),
                    description: "Maximum results to include, 1-20 (default: 5)".to_string(),
                    required: false,
                    ..Default::default()
                },
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "web".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let query = get_str(args, "query")
            .ok_or_else(|| anyhow::anyhow!("missing required param: query"))?;
        let count: usize = args
            .get("count")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(5)
            .clamp(1, 20);

        let key = self
            .brave_api_key
            .clone()
            .filter(|k| !k.trim().is_empty());

        match key {
            Some(key) => self.search_brave(query, count, &key).await,
            None => self.search_duckduckgo(query, count).await,
        }
    }
}

impl WebSearchTool {
    async fn search_brave(&self, query: &str, count: usize, api_key: &str) -> Result<ToolOutput> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("turnkeep/0.1")
            .build()?;

        let mut attempt = 0;
        let resp = loop {
            let resp = client
                .get("https://api.search.brave.com/res/v1/web/search")
                .query(&[("q", query), ("count", &count.to_string())])
                .header("Accept", "application/json")
                .header("X-Subscription-Token", api_key)
                .send()
                .await?;

            if resp.status().as_u16() == 429 && attempt < 3 {
                attempt += 1;
                tokio::time::sleep(std::time::Duration::from_millis(300 * attempt as u64)).await;
                continue;
            }
            if resp.status().as_u16() == 429 {
                return Ok(ToolOutput::fail(
                    "search provider is rate-limited, try again shortly",
                ));
            }
            if !resp.status().is_success() {
                return Ok(ToolOutput::fail("search provider returned an error"));
            }
            break resp;
        };

        let json: Value = resp.json().await?;
        let mut parts: Vec<String> = Vec::new();
        let mut page_urls: Vec<String> = Vec::new();
        if let Some(results) = json["web"]["results"].as_array() {
            for item in results.iter().take(count) {
                let title = item["title"].as_str().unwrap_or("").trim();
                let url = item["url"].as_str().unwrap_or("").trim();
                let desc = item["description"].as_str().unwrap_or("").trim();
                if !title.is_empty() {
                    if page_urls.len() < 3 && !url.is_empty() {
                        page_urls.push(url.to_string());
                    }
                    parts.push(format!("{title}\n  {url}\n  {desc}"));
                }
            }
        }
        for url in &page_urls {
            if let Some(excerpt) = fetch_page_excerpt(&client, url, 4000).await {
                parts.push(format!("\n--- Page content from {url} ---\n{excerpt}"));
            }
        }

        Ok(if parts.is_empty() {
            ToolOutput::ok(format!("No Brave Search results for: {query}"))
        } else {
            ToolOutput::ok(parts.join("\n\n"))
        })
    }

    async fn search_duckduckgo(&self, query: &str, count: usize) -> Result<ToolOutput> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("turnkeep/0.1")
            .build()?;

        let resp = client
            .get("https://api.duckduckgo.com/")
            .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("skip_disambig", "1")])
            .send()
            .await?;
        let json: Value = resp.json().await?;

        let abstract_text = json["AbstractText"].as_str().unwrap_or("").trim().to_string();
        let abstract_source = json["AbstractSource"].as_str().unwrap_or("").trim().to_string();
        let abstract_url = json["AbstractURL"].as_str().unwrap_or("").trim().to_string();

        let mut parts: Vec<String> = Vec::new();
        if !abstract_text.is_empty() {
            parts.push(if abstract_source.is_empty() {
                abstract_text
            } else {
                format!("{abstract_text} (source: {abstract_source})")
            });
        }
        if let Some(topics) = json["RelatedTopics"].as_array() {
            for topic in topics.iter().take(count) {
                let text = topic["Text"].as_str().unwrap_or("").trim();
                if !text.is_empty() {
                    parts.push(format!("• {text}"));
                }
            }
        }
        if !abstract_url.is_empty() {
            if let Some(excerpt) = fetch_page_excerpt(&client, &abstract_url, 4000).await {
                parts.push(format!("\n--- Page content from {abstract_url} ---\n{excerpt}"));
            }
        }

        Ok(if parts.is_empty() {
            ToolOutput::ok(format!("No instant-answer results found for: {query}"))
        } else {
            ToolOutput::ok(parts.join("\n"))
        })
    }
}

/// External collaborator for rendering a page visually. The default
/// configuration has no driver, so `screenshot` mode reports
/// UPSTREAM_ERROR; a real deployment wires in a headless-browser
/// implementation of this trait.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn screenshot(&self, url: &str) -> Result<Vec<u8>>;
}

const TEXT_MODE_CAP: usize = 16 * 1024;
const HTML_MODE_CAP: usize = 24 * 1024;

fn normalize_url(raw: &str) -> Result<String, &'static str> {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Ok(raw.to_string());
    }
    if raw.contains("://") {
        return Err("Only http and https URLs are allowed");
    }
    Ok(format!("https://{raw}"))
}

fn truncate_with_suffix(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }
    let end = truncate_byte_boundary(text, cap);
    format!("{}… (truncated)", &text[..end])
}

pub struct BrowserTool {
    pub driver: Option<std::sync::Arc<dyn BrowserDriver>>,
}

#[async_trait]
impl Tool for BrowserTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "browser".to_string(),
            description: "Fetch a web page in text, html, or screenshot mode.".to_string(),
            params: vec![
                ToolParam {
                    name: "url".to_string(),
                    description: "Target URL (http/https only)".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "mode".to_string(),
                    description: "One of: text, html, screenshot (default: text)".to_string(),
                    required: false,
                    ..Default::default()
                },
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Medium,
                read_only: true,
                group: "web".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let raw_url = get_str(args, "url")
            .ok_or_else(|| anyhow::anyhow!("missing required param: url"))?;
        let mode = get_str(args, "mode").unwrap_or("text");

        let url = match normalize_url(raw_url) {
            Ok(u) => u,
            Err(e) => return Ok(ToolOutput::fail(e)),
        };

        match mode {
            "screenshot" => match &self.driver {
                Some(driver) => {
                    let png = driver.screenshot(&url).await?;
                    Ok(ToolOutput::ok(format!("captured screenshot of {url}")).with_attachment(
                        Attachment {
                            kind: AttachmentType::Image,
                            filename: "screenshot.png".to_string(),
                            mime_type: "image/png".to_string(),
                            bytes: png,
                        },
                    ))
                }
                None => Ok(ToolOutput::fail(
                    "UPSTREAM_ERROR: no browser driver configured for screenshot mode",
                )),
            },
            "html" => {
                let client = reqwest::Client::builder()
                    .timeout(std::time::Duration::from_secs(15))
                    .user_agent("turnkeep/0.1")
                    .build()?;
                let body = client.get(&url).send().await?.text().await?;
                Ok(ToolOutput::ok(truncate_with_suffix(&body, HTML_MODE_CAP)))
            }
            _ => {
                let client = reqwest::Client::builder()
                    .timeout(std::time::Duration::from_secs(15))
                    .user_agent("turnkeep/0.1")
                    .build()?;
                let body = client.get(&url).send().await?.text().await?;
                let text = html_to_text(&body, TEXT_MODE_CAP);
                Ok(ToolOutput::ok(truncate_with_suffix(&text, TEXT_MODE_CAP)))
            }
        }
    }
}

/// Fetches a page and extracts a plain-text excerpt. Returns `None` on any
/// error so callers fall back gracefully to search snippet data.
async fn fetch_page_excerpt(client: &reqwest::Client, url: &str, max_chars: usize) -> Option<String> {
    let resp = client
        .get(url)
        .timeout(std::time::Duration::from_secs(8))
        .header("Accept", "text/html")
        .send()
        .await
        .ok()?;

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.contains("text/html") && !content_type.contains("text/plain") {
        return None;
    }

    let body = resp.text().await.ok()?;
    let body = if body.len() > 256_000 {
        let end = truncate_byte_boundary(&body, 256_000);
        &body[..end]
    } else {
        &body
    };

    let structured = extract_structured_data(body);
    let plain = html_to_text(body, max_chars);

    if structured.is_empty() {
        Some(plain)
    } else if plain.is_empty() {
        Some(structured)
    } else {
        let struct_budget = max_chars / 3;
        let struct_part = if structured.len() > struct_budget {
            let end = truncate_byte_boundary(&structured, struct_budget);
            format!("{}…", &structured[..end])
        } else {
            structured
        };
        Some(format!("{struct_part}\n\n{plain}"))
    }
}

/// Minimal HTML-to-text extraction. Strips tags, drops script/style/nav
/// blocks, decodes common entities, collapses whitespace.
pub(super) fn html_to_text(html: &str, max_chars: usize) -> String {
    let mut cleaned = String::with_capacity(html.len());
    let mut skip_depth: usize = 0;
    let mut chars = html.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '<' {
            let mut tag_chars = Vec::new();
            let is_close = chars.peek() == Some(&'/');
            if is_close {
                chars.next();
            }
            while let Some(&c) = chars.peek() {
                if c == '>' || c == ' ' || c == '/' {
                    break;
                }
                tag_chars.push(c);
                chars.next();
            }
            let tag_name: String = tag_chars.into_iter().collect::<String>().to_ascii_lowercase();
            while let Some(&c) = chars.peek() {
                if c == '>' {
                    chars.next();
                    break;
                }
                chars.next();
            }

            let strip_tags = ["script", "style", "nav", "header", "footer", "noscript", "svg"];
            if strip_tags.contains(&tag_name.as_str()) {
                if is_close {
                    skip_depth = skip_depth.saturating_sub(1);
                } else {
                    skip_depth += 1;
                }
                continue;
            }
            if skip_depth > 0 {
                continue;
            }

            let block_tags = [
                "p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr", "td", "th",
                "article", "section", "main",
            ];
            if block_tags.contains(&tag_name.as_str()) {
                cleaned.push('\n');
            }
        } else if skip_depth == 0 {
            cleaned.push(ch);
        }
    }

    let cleaned = cleaned
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");

    let mut result = String::with_capacity(cleaned.len().min(max_chars + 64));
    let mut prev_was_space = true;
    let mut consecutive_newlines = 0u32;
    for ch in cleaned.chars() {
        if ch == '\n' {
            consecutive_newlines += 1;
            if consecutive_newlines <= 2 {
                result.push('\n');
            }
            prev_was_space = true;
        } else if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
            consecutive_newlines = 0;
        } else {
            result.push(ch);
            prev_was_space = false;
            consecutive_newlines = 0;
        }
        if result.len() >= max_chars {
            break;
        }
    }

    let trimmed = result.trim().to_string();
    if trimmed.len() > max_chars {
        let safe_end = truncate_byte_boundary(&trimmed, max_chars);
        let end = trimmed[..safe_end].rfind(' ').unwrap_or(safe_end);
        format!("{}…", &trimmed[..end])
    } else {
        trimmed
    }
}

/// Extracts `<title>`, select `<meta>` tags, and JSON-LD blocks, which
/// survive JavaScript-heavy pages where the rendered body text is empty.
fn extract_structured_data(html: &str) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(start) = html.to_ascii_lowercase().find("<title") {
        if let Some(gt) = html[start..].find('>') {
            let after = start + gt + 1;
            if let Some(end) = html[after..].find("</") {
                let title = html[after..after + end].trim();
                if !title.is_empty() && title.len() < 500 {
                    lines.push(format!("Title: {title}"));
                }
            }
        }
    }

    let lower = html.to_ascii_lowercase();
    let interesting_attrs = [
        "og:title", "og:description", "og:type", "description", "twitter:title",
        "twitter:description",
    ];
    let price_keywords = ["price", "amount", "stock", "ticker", "quote"];

    let mut search_from = 0;
    while let Some(pos) = lower[search_from..].find("<meta") {
        let abs_pos = search_from + pos;
        let tag_end = match html[abs_pos..].find('>') {
            Some(e) => abs_pos + e,
            None => break,
        };
        let tag = &html[abs_pos..=tag_end];
        let tag_lower = &lower[abs_pos..=tag_end];

        let attr_val = |attr: &str| -> Option<&str> {
            let needle = format!("{attr}=\"");
            tag_lower
                .find(&needle)
                .and_then(|i| {
                    let start = i + needle.len();
                    tag[start..].find('"').map(|end| tag[start..start + end].trim())
                })
        };

        let name = attr_val("name").or_else(|| attr_val("property")).unwrap_or("");
        let content = attr_val("content").unwrap_or("");
        if !content.is_empty() && content.len() < 500 {
            let name_lower = name.to_ascii_lowercase();
            let is_interesting = interesting_attrs.iter().any(|a| name_lower == *a)
                || price_keywords.iter().any(|kw| name_lower.contains(kw));
            if is_interesting {
                lines.push(format!("meta[{name}]: {content}"));
            }
        }
        search_from = tag_end + 1;
    }

    let ld_marker = "application/ld+json";
    let mut ld_from = 0;
    while let Some(pos) = lower[ld_from..].find(ld_marker) {
        let abs_pos = ld_from + pos;
        let script_body_start = match html[abs_pos..].find('>') {
            Some(e) => abs_pos + e + 1,
            None => break,
        };
        let script_body_end = match lower[script_body_start..].find("</script") {
            Some(e) => script_body_start + e,
            None => break,
        };
        let json_str = html[script_body_start..script_body_end].trim();
        if !json_str.is_empty() && json_str.len() < 8000 {
            if let Ok(val) = serde_json::from_str::<Value>(json_str) {
                let summary = summarise_ld_json(&val);
                if !summary.is_empty() {
                    lines.push(format!("LD+JSON: {summary}"));
                }
            }
        }
        ld_from = script_body_end + 1;
    }

    lines.join("\n")
}

fn summarise_ld_json(val: &Value) -> String {
    if let Some(graph) = val.get("@graph").and_then(|g| g.as_array()) {
        let summaries: Vec<String> = graph
            .iter()
            .filter_map(|item| {
                let s = summarise_ld_json(item);
                if s.is_empty() { None } else { Some(s) }
            })
            .take(3)
            .collect();
        return summaries.join(" | ");
    }

    let mut parts: Vec<String> = Vec::new();
    let type_val = val.get("@type").and_then(|t| t.as_str()).unwrap_or("");
    if !type_val.is_empty() {
        parts.push(format!("type={type_val}"));
    }
    for key in &[
        "name", "headline", "description", "tickerSymbol", "price", "priceCurrency", "lowPrice",
        "highPrice", "url", "exchange", "currentPrice", "previousClose", "openPrice", "dayLow",
        "dayHigh", "52WeekLow", "52WeekHigh",
    ] {
        if let Some(v) = val.get(*key) {
            let text = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => continue,
            };
            if !text.is_empty() && text.len() < 300 {
                parts.push(format!("{key}={text}"));
            }
        }
    }
    if let Some(offers) = val.get("offers") {
        let offer_summary = summarise_ld_json(offers);
        if !offer_summary.is_empty() {
            parts.push(format!("offers({offer_summary})"));
        }
    }
    if parts.len() <= 1 {
        return String::new();
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_strips_tags() {
        let out = html_to_text("<p>hello</p>", 1000);
        assert!(out.contains("hello"));
        assert!(!out.contains("<p>"));
    }

    #[test]
    fn html_strips_script_blocks() {
        let out = html_to_text("<p>before</p><script>alert('xss');</script><p>after</p>", 1000);
        assert!(out.contains("before"));
        assert!(out.contains("after"));
        assert!(!out.contains("alert"));
    }

    #[test]
    fn html_decodes_entities() {
        let out = html_to_text("&amp; &lt; &gt;", 1000);
        assert!(out.contains('&'));
        assert!(out.contains('<'));
        assert!(out.contains('>'));
    }

    #[test]
    fn html_strips_style_blocks() {
        let out = html_to_text("<style>body{color:red}</style><p>text</p>", 1000);
        assert!(out.contains("text"));
        assert!(!out.contains("color:red"));
    }

    #[test]
    fn html_collapses_whitespace() {
        let out = html_to_text("<p>  lots   of   spaces  </p>", 1000);
        assert!(!out.contains("  "), "got: {out}");
    }

    #[test]
    fn html_respects_max_chars() {
        let big = "<p>".to_owned() + &"a".repeat(500) + "</p>";
        let out = html_to_text(&big, 100);
        assert!(out.len() <= 104, "len={}: {}", out.len(), out);
    }

    #[test]
    fn html_handles_cjk_and_emoji_content() {
        let out = html_to_text("<div>日本語テスト</div><p>hello 🌍🎉</p>", 1000);
        assert!(out.contains("日本語テスト"));
        assert!(out.contains("🌍"));
        assert!(out.contains("🎉"));
    }

    #[test]
    fn html_empty_input() {
        assert!(html_to_text("", 1000).is_empty());
    }

    #[test]
    fn html_plain_text_passthrough() {
        assert_eq!(html_to_text("just plain text", 1000), "just plain text");
    }

    #[test]
    fn normalize_url_rejects_non_http_schemes() {
        assert!(normalize_url("javascript:alert(1)").is_err());
        assert!(normalize_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn normalize_url_prepends_https_for_bare_host() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com");
    }

    #[test]
    fn truncate_with_suffix_appends_marker() {
        let long = "a".repeat(100);
        let out = truncate_with_suffix(&long, 10);
        assert!(out.ends_with("… (truncated)"));
    }
}
