//! [`Driver`] over a live `eoka` page. Elements are resolved by injected JS
//! into unique CSS selectors.

use super::{Download, Driver, Element};
use crate::locator::Strategy;
use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use eoka::Page;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const DOWNLOAD_POLL_MS: u64 = 250;

const FIND_JS: &str = r#"
((type, value) => {
    const lc = s => (s || '').toLowerCase().trim();
    const valLc = lc(value);

    function selector(el) {
        if (el.id) return '#' + CSS.escape(el.id);
        const path = [];
        let n = el;
        while (n && n.nodeType === 1) {
            let s = n.tagName.toLowerCase();
            if (n.id) { path.unshift('#' + CSS.escape(n.id)); break; }
            const p = n.parentElement;
            if (p) {
                const sibs = [...p.children].filter(c => c.tagName === n.tagName);
                if (sibs.length > 1) s += ':nth-of-type(' + (sibs.indexOf(n) + 1) + ')';
            }
            path.unshift(s);
            n = p;
        }
        return path.join(' > ');
    }

    function visible(el) {
        const r = el.getBoundingClientRect();
        const s = getComputedStyle(el);
        return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
    }

    let found = [];
    try {
        switch (type) {
            case 'text': {
                const hits = [...document.body.querySelectorAll('*')]
                    .filter(el => lc(el.innerText).includes(valLc) && visible(el));
                found = hits.filter(el => !hits.some(o => o !== el && el.contains(o)));
                break;
            }
            case 'link':
                found = [...document.querySelectorAll('a,[role="link"]')]
                    .filter(el => lc(el.innerText).includes(valLc) && visible(el));
                break;
            case 'placeholder':
                found = [...document.querySelectorAll('input,textarea')]
                    .filter(e => lc(e.placeholder).includes(valLc));
                break;
            case 'role':
                found = [...document.querySelectorAll('*')]
                    .filter(e => e.getAttribute('role') === value || e.tagName.toLowerCase() === valLc);
                break;
            case 'css':
                found = [...document.querySelectorAll(value)];
                break;
            case 'id': {
                const el = document.getElementById(value);
                if (el) found = [el];
                break;
            }
        }
    } catch (e) {
        found = [];
    }

    return found.map(el => ({ selector: selector(el), tag: el.tagName.toLowerCase() }));
})
"#;

const TEXT_OF_JS: &str = r#"
((sel) => {
    const el = document.querySelector(sel);
    return el ? (el.innerText ?? el.textContent ?? '') : null;
})
"#;

const START_DOWNLOAD_JS: &str = r#"
((sel) => {
    const el = document.querySelector(sel);
    if (!el) return 'missing';
    const raw = (el.getAttribute('href') || '').trim();
    if (!raw || raw.toLowerCase().startsWith('javascript:')) return 'click';
    if (raw.startsWith('#')) return 'same_document';
    const url = new URL(raw, location.href);
    if (url.href.split('#')[0] === location.href.split('#')[0]) return 'same_document';
    window.__portalDownload = { done: false };
    fetch(url.href, { credentials: 'include' })
        .then(async r => {
            if (!r.ok) throw new Error('HTTP ' + r.status);
            const disposition = r.headers.get('content-disposition');
            const m = (disposition || '').match(/filename\*?=(?:UTF-8'')?"?([^";]+)"?/i);
            const bytes = new Uint8Array(await r.arrayBuffer());
            let bin = '';
            for (let i = 0; i < bytes.length; i += 0x8000) {
                bin += String.fromCharCode.apply(null, bytes.subarray(i, i + 0x8000));
            }
            window.__portalDownload = {
                done: true,
                data: btoa(bin),
                filename: m ? decodeURIComponent(m[1]) : null,
                contentType: r.headers.get('content-type'),
                disposition: disposition,
            };
        })
        .catch(e => { window.__portalDownload = { done: true, error: String(e) }; });
    return 'started';
})
"#;

const POLL_DOWNLOAD_JS: &str = "window.__portalDownload || null";

/// Page coordinates of an element, scrolled into view first.
const RECT_JS: &str = r#"
((sel) => {
    const el = document.querySelector(sel);
    if (!el) return null;
    el.scrollIntoView({ block: 'center', inline: 'center' });
    const r = el.getBoundingClientRect();
    return { x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height };
})
"#;

#[derive(Debug, Deserialize)]
struct DownloadState {
    done: bool,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "contentType")]
    content_type: Option<String>,
    #[serde(default)]
    disposition: Option<String>,
}

impl DownloadState {
    /// A finished fetch as a document. An HTML page served inline is the
    /// portal re-rendering itself, not a file.
    fn into_download(self) -> Result<Download> {
        if let Some(error) = self.error {
            return Err(Error::DownloadFailure(error));
        }
        let html = self
            .content_type
            .as_deref()
            .is_some_and(|t| t.to_ascii_lowercase().contains("text/html"));
        if html && self.disposition.is_none() {
            return Err(Error::DownloadFailure(
                "link served an HTML page, not a document".into(),
            ));
        }
        let data = self.data.unwrap_or_default();
        let bytes = BASE64
            .decode(data.as_bytes())
            .map_err(|e| Error::DownloadFailure(format!("corrupt payload: {}", e)))?;
        Ok(Download {
            bytes,
            filename: self.filename,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct Capture {
    data: String,
}

/// The finished file in a browser download directory. Chrome writes to a
/// `.crdownload` file until the transfer completes.
fn completed_download(dir: &Path) -> Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let partial = path.extension().is_some_and(|ext| ext == "crdownload");
        if path.is_file() && !partial && std::fs::metadata(&path)?.len() > 0 {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Drives a real Chromium page.
pub struct BrowserDriver {
    page: Page,
}

impl BrowserDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// The underlying page.
    pub fn page(&self) -> &Page {
        &self.page
    }

    fn call(script: &str, args: &[&str]) -> String {
        let args: Vec<String> = args
            .iter()
            .map(|a| serde_json::Value::from(*a).to_string())
            .collect();
        format!("{}({})", script, args.join(","))
    }
}

impl Driver for BrowserDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        debug!("goto: {}", url);
        self.page.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?)
    }

    async fn find(&self, strategy: &Strategy) -> Result<Vec<Element>> {
        let (kind, value) = strategy.as_js_args();
        let js = Self::call(FIND_JS, &[kind, value]);
        Ok(self.page.evaluate(&js).await?)
    }

    async fn text_of(&self, element: &Element) -> Result<String> {
        let js = Self::call(TEXT_OF_JS, &[&element.selector]);
        let text: Option<String> = self.page.evaluate(&js).await?;
        text.ok_or_else(|| Error::Driver(format!("element {} is no longer attached", element)))
    }

    async fn click(&self, element: &Element) -> Result<()> {
        self.page.click(&element.selector).await?;
        Ok(())
    }

    async fn fill(&self, element: &Element, value: &str) -> Result<()> {
        self.page.fill(&element.selector, value).await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.page.human().press_key(key).await?;
        Ok(())
    }

    async fn page_text(&self) -> Result<String> {
        Ok(self.page.text().await?)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }

    async fn screenshot_element(&self, element: &Element) -> Result<Vec<u8>> {
        let js = Self::call(RECT_JS, &[&element.selector]);
        let rect: Option<Rect> = self.page.evaluate(&js).await?;
        let rect = rect
            .filter(|r| r.width > 0.0 && r.height > 0.0)
            .ok_or_else(|| Error::Driver(format!("element {} has no visible box", element)))?;
        let params = serde_json::json!({
            "format": "png",
            "captureBeyondViewport": true,
            "clip": {
                "x": rect.x,
                "y": rect.y,
                "width": rect.width,
                "height": rect.height,
                "scale": 1,
            },
        });
        let capture: Capture = self
            .page
            .session()
            .send("Page.captureScreenshot", &params)
            .await?;
        BASE64
            .decode(capture.data.as_bytes())
            .map_err(|e| Error::Driver(format!("corrupt screenshot: {}", e)))
    }

    async fn download(&self, link: &Element, timeout: Duration) -> Result<Download> {
        let js = Self::call(START_DOWNLOAD_JS, &[&link.selector]);
        let started: String = self.page.evaluate(&js).await?;
        match started.as_str() {
            "started" => self.fetch_download(timeout).await,
            "click" => self.click_download(link, timeout).await,
            "same_document" => Err(Error::DownloadFailure(format!(
                "{} links back to the current page",
                link
            ))),
            _ => Err(Error::DownloadFailure(format!(
                "{} is no longer attached",
                link
            ))),
        }
    }
}

impl BrowserDriver {
    async fn fetch_download(&self, timeout: Duration) -> Result<Download> {
        let deadline = Instant::now() + timeout;
        loop {
            let state: Option<DownloadState> = self.page.evaluate(POLL_DOWNLOAD_JS).await?;
            if let Some(state) = state.filter(|s| s.done) {
                let download = state.into_download()?;
                debug!("download complete: {} bytes", download.bytes.len());
                return Ok(download);
            }
            if Instant::now() >= deadline {
                return Err(Error::DownloadFailure(format!(
                    "no completed download within {}ms",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(Duration::from_millis(DOWNLOAD_POLL_MS)).await;
        }
    }

    /// Script-driven links (ASP.NET postbacks) only yield a file through a
    /// real click, so let Chrome save it and pick it up from disk.
    async fn click_download(&self, link: &Element, timeout: Duration) -> Result<Download> {
        let dir = tempfile::tempdir()?;
        let allow = serde_json::json!({
            "behavior": "allow",
            "downloadPath": dir.path().display().to_string(),
        });
        self.page
            .session()
            .send::<_, serde_json::Value>("Page.setDownloadBehavior", &allow)
            .await?;
        debug!("downloading {} by click into {}", link, dir.path().display());

        let result = self.await_click_download(link, dir.path(), timeout).await;

        let reset = serde_json::json!({ "behavior": "default" });
        if let Err(e) = self
            .page
            .session()
            .send::<_, serde_json::Value>("Page.setDownloadBehavior", &reset)
            .await
        {
            debug!("could not reset download behaviour: {}", e);
        }
        result
    }

    async fn await_click_download(
        &self,
        link: &Element,
        dir: &Path,
        timeout: Duration,
    ) -> Result<Download> {
        self.page.click(&link.selector).await?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(path) = completed_download(dir)? {
                let bytes = std::fs::read(&path)?;
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
                debug!("download complete: {} bytes", bytes.len());
                return Ok(Download { bytes, filename });
            }
            if Instant::now() >= deadline {
                return Err(Error::DownloadFailure(format!(
                    "clicking {} started no download within {}ms",
                    link,
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(Duration::from_millis(DOWNLOAD_POLL_MS)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_quotes_arguments_as_json() {
        let js = BrowserDriver::call("(f)", &["css", "a[href=\"x\"]"]);
        assert_eq!(js, r#"(f)("css","a[href=\"x\"]")"#);
    }

    #[test]
    fn download_state_tolerates_missing_fields() {
        let state: DownloadState = serde_json::from_str(r#"{"done": false}"#).unwrap();
        assert!(!state.done);
        assert!(state.data.is_none() && state.error.is_none());
    }

    fn finished(content_type: &str, disposition: Option<&str>) -> DownloadState {
        let json = serde_json::json!({
            "done": true,
            "data": BASE64.encode(b"%PDF-1.4"),
            "contentType": content_type,
            "disposition": disposition,
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn inline_html_is_not_a_document() {
        let err = finished("text/html; charset=utf-8", None)
            .into_download()
            .unwrap_err();
        assert!(matches!(err, Error::DownloadFailure(ref m) if m.contains("HTML page")));
    }

    #[test]
    fn attachment_is_accepted_whatever_its_type() {
        let download = finished("text/html", Some("attachment; filename=\"notice.pdf\""))
            .into_download()
            .unwrap();
        assert_eq!(download.bytes, b"%PDF-1.4");
    }

    #[test]
    fn pdf_body_decodes() {
        let download = finished("application/pdf", None).into_download().unwrap();
        assert_eq!(download.bytes, b"%PDF-1.4");
        assert!(download.filename.is_none());
    }

    #[test]
    fn fetch_error_is_a_download_failure() {
        let state: DownloadState =
            serde_json::from_str(r#"{"done": true, "error": "TypeError: Failed to fetch"}"#).unwrap();
        assert!(matches!(state.into_download(), Err(Error::DownloadFailure(_))));
    }

    #[test]
    fn partial_and_empty_files_are_not_finished_downloads() {
        let dir = tempfile::tempdir().unwrap();
        assert!(completed_download(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join("notice.pdf.crdownload"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("empty.pdf"), b"").unwrap();
        assert!(completed_download(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join("notice.pdf"), b"%PDF-1.4").unwrap();
        let found = completed_download(dir.path()).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "notice.pdf");
    }
}
