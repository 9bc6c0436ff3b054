//! Chromium-backed page extraction over CDP.
//!
//! The session is one browser plus one tab, owned exclusively by the
//! orchestrator. Restart tears the whole thing down and relaunches; a
//! half-torn-down session is never observable because every operation
//! goes through `&mut self`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{search_results_url, ExtractError, PageExtractor, SearchHit};
use crate::config::BrowserSettings;
use crate::models::{DayShowtimes, ListingRef, RatingFields, RawDetails};

pub const IMDB_BASE_URL: &str = "https://www.imdb.com";

/// Cinema-site selectors (todoshowcase.com billboard layout).
mod cinema {
    pub const LISTING_LINKS: &str = "#cartelera_cine_40212 > .boxfilm > .afiche-pelicula > a";
    pub const FORMAT_BLOCK: &str = ".op_format";
    pub const TITLE: &str = ".movie-info-box .name > strong";
    pub const POSTER: &str = ".movie-side-info-box figure > img";
    pub const SIDE_INFO_ITEMS: &str = ".movie-side-info-box ul > li";
    pub const DURATION: &str = ".movie-info-box ul.features .year";
    pub const DAY_BUTTONS: &str = ".movie-info-box .op_days > button";

    pub const ORIGINAL_TITLE_PREFIX: &str = "Título Original: ";
    pub const DIRECTOR_PREFIX: &str = "Director: ";
}

/// IMDb selectors.
mod imdb {
    pub const SEARCH_RESULT_LINKS: &str = "li.find-title-result a.ipc-metadata-list-summary-item__t";
    pub const PRINCIPAL_CREDITS: &str = "[data-testid='title-pc-principal-credit']";
    pub const TITLE_HERO: &str = "[data-testid='hero__pageTitle']";
    pub const DURATION: &str =
        "[data-testid='hero__pageTitle'] ~ ul[role='presentation'] > li:last-of-type";
    pub const RATING: &str = "div[data-testid='hero-rating-bar__aggregate-rating__score'] > span";
    pub const METASCORE: &str = "span.metacritic-score-box";
}

/// Reads the format -> times map for the currently selected day.
const SHOWTIMES_SCRIPT: &str = r#"
    (() => {
        const out = {};
        for (const fmt of document.querySelectorAll('.op_format')) {
            const label = (fmt.textContent || '').trim();
            const sibling = fmt.nextElementSibling;
            const times = sibling
                ? Array.from(sibling.querySelectorAll('button.op_perf'))
                    .map((b) => (b.textContent || '').trim())
                : [];
            out[label] = times;
        }
        return out;
    })()
"#;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const RESTART_PAUSE: Duration = Duration::from_secs(2);

/// Common Chrome binary locations, checked before `PATH`.
const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Exclusive browser session implementing [`PageExtractor`].
pub struct BrowserSession {
    settings: BrowserSettings,
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
    current_url: String,
}

impl BrowserSession {
    /// Launch (or attach to) a browser. Failure here is the one fatal
    /// startup error of the whole program.
    pub async fn launch(settings: BrowserSettings) -> anyhow::Result<Self> {
        let mut session = Self {
            settings,
            browser: None,
            page: None,
            handler_task: None,
            current_url: String::new(),
        };
        session.start().await?;
        Ok(session)
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        let (browser, handler_task) = match self.settings.remote_url.clone() {
            Some(remote) => Self::connect_remote(&remote).await?,
            None => Self::launch_local(&self.settings).await?,
        };

        let page = browser
            .new_page("about:blank")
            .await
            .context("opening initial tab")?;

        self.browser = Some(browser);
        self.page = Some(page);
        self.handler_task = Some(handler_task);
        Ok(())
    }

    async fn launch_local(settings: &BrowserSettings) -> anyhow::Result<(Browser, JoinHandle<()>)> {
        let chrome_path = Self::find_chrome(settings)?;
        info!(
            "Launching browser at {} (headless={})",
            chrome_path.display(),
            settings.headless
        );

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);
        if !settings.headless {
            builder = builder.with_head();
        }
        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("building browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launching browser")?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        Ok((browser, handler_task))
    }

    /// Attach to an already-running browser via its DevTools endpoint.
    async fn connect_remote(url: &str) -> anyhow::Result<(Browser, JoinHandle<()>)> {
        info!("Connecting to remote browser at {}", url);

        let http_url = url.replace("ws://", "http://").replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .context("reaching remote browser")?
            .json()
            .await
            .context("parsing browser version info")?;
        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("no webSocketDebuggerUrl in {}", version_url))?;

        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .context("connecting to remote browser")?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        Ok((browser, handler_task))
    }

    fn find_chrome(settings: &BrowserSettings) -> anyhow::Result<PathBuf> {
        if let Some(path) = &settings.binary_path {
            return Ok(path.clone());
        }
        for path in CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                return Ok(p.to_path_buf());
            }
        }
        for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
            if let Ok(path) = which::which(name) {
                return Ok(path);
            }
        }
        Err(anyhow::anyhow!(
            "no Chrome/Chromium binary found; install one or pass --chromedriver-path"
        ))
    }

    /// Best-effort teardown; errors are logged and swallowed.
    async fn teardown(&mut self) {
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close failed during teardown: {}", e);
            }
            let _ = browser.wait().await;
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
    }

    /// Graceful shutdown at the end of a run.
    pub async fn close(mut self) {
        self.teardown().await;
    }

    fn page(&self) -> Result<Page, ExtractError> {
        self.page.clone().ok_or(ExtractError::SessionDown)
    }

    async fn goto(&mut self, url: &str) -> Result<Page, ExtractError> {
        let page = self.page()?;
        self.current_url = url.to_string();
        page.goto(url).await?;
        page.wait_for_navigation().await?;
        Ok(page)
    }

    /// Poll for an element until the fixed wait elapses. A wait that
    /// never resolves is a transient failure, not a hang.
    async fn wait_for(&self, selector: &str) -> Result<Element, ExtractError> {
        let page = self.page()?;
        let deadline = Instant::now() + Duration::from_secs(self.settings.wait_timeout_secs);
        loop {
            match page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(_) if Instant::now() < deadline => tokio::time::sleep(POLL_INTERVAL).await,
                Err(_) => {
                    return Err(ExtractError::ElementTimeout {
                        url: self.current_url.clone(),
                        selector: selector.to_string(),
                    })
                }
            }
        }
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>, ExtractError> {
        let page = self.page()?;
        match page.find_element(selector).await {
            Ok(element) => Ok(element
                .inner_text()
                .await?
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())),
            Err(_) => Ok(None),
        }
    }

    /// Showtimes for every day button on an open detail page. Day
    /// buttons are clicked by index inside the page to avoid stale
    /// element handles between reloads.
    async fn collect_showtimes(
        &mut self,
        days: &[String],
    ) -> Result<HashMap<String, DayShowtimes>, ExtractError> {
        let page = self.page()?;
        let mut showtimes = HashMap::new();

        for (index, day) in days.iter().enumerate() {
            let click = format!(
                "(() => {{ const b = document.querySelectorAll('{}')[{}]; if (b) b.click(); }})()",
                cinema::DAY_BUTTONS,
                index
            );
            page.evaluate(click).await?;
            self.wait_for(cinema::FORMAT_BLOCK).await?;

            let by_format: DayShowtimes = page
                .evaluate(SHOWTIMES_SCRIPT)
                .await?
                .into_value()?;
            showtimes.insert(day.clone(), by_format);
        }
        Ok(showtimes)
    }
}

/// Resolve an IMDb result href to an absolute title URL without the
/// result-tracking query noise.
fn absolute_title_url(href: &str) -> Option<String> {
    let base = url::Url::parse(IMDB_BASE_URL).ok()?;
    let mut resolved = base.join(href).ok()?;
    resolved.set_query(None);
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

#[async_trait]
impl PageExtractor for BrowserSession {
    async fn enumerate_listings(&mut self, base_url: &str) -> Result<Vec<ListingRef>, ExtractError> {
        let page = self.goto(base_url).await?;
        self.wait_for(cinema::LISTING_LINKS).await?;

        let mut refs = Vec::new();
        for link in page.find_elements(cinema::LISTING_LINKS).await? {
            if let Some(href) = link.attribute("href").await? {
                refs.push(href);
            }
        }
        debug!("Found {} listing links", refs.len());
        Ok(refs)
    }

    async fn extract_details(&mut self, href: &str) -> Result<RawDetails, ExtractError> {
        let page = self.goto(href).await?;
        self.wait_for(cinema::FORMAT_BLOCK).await?;

        let title = self
            .text_of(cinema::TITLE)
            .await?
            .ok_or(ExtractError::MissingField("title"))?;
        let duration = self
            .text_of(cinema::DURATION)
            .await?
            .ok_or(ExtractError::MissingField("duration"))?;

        let poster_url = match page.find_element(cinema::POSTER).await {
            Ok(img) => img.attribute("src").await?.unwrap_or_default(),
            Err(_) => String::new(),
        };

        let mut original_title = String::new();
        let mut director = None;
        for item in page.find_elements(cinema::SIDE_INFO_ITEMS).await? {
            let Some(text) = item.inner_text().await? else {
                continue;
            };
            let text = text.trim();
            if let Some(stripped) = text.strip_prefix(cinema::ORIGINAL_TITLE_PREFIX) {
                original_title = stripped.trim().to_string();
            } else if let Some(stripped) = text.strip_prefix(cinema::DIRECTOR_PREFIX) {
                director = Some(stripped.trim().to_string());
            }
        }
        if original_title.is_empty() {
            // The side box always leads with the original title; fall
            // back to the display title rather than failing the listing.
            original_title = title.clone();
        }

        let mut showing_days = Vec::new();
        for button in page.find_elements(cinema::DAY_BUTTONS).await? {
            if let Some(value) = button.attribute("value").await? {
                showing_days.push(value);
            }
        }

        let showtimes = self.collect_showtimes(&showing_days).await?;

        Ok(RawDetails {
            title,
            original_title,
            poster_url,
            duration,
            showing_days,
            showtimes,
            director,
        })
    }

    async fn search_external(&mut self, query: &str) -> Result<Vec<SearchHit>, ExtractError> {
        let page = self.goto(&search_results_url(query)).await?;

        // A results page with zero hits has no result list at all, so a
        // timeout here is "no results", not a failure.
        if self.wait_for(imdb::SEARCH_RESULT_LINKS).await.is_err() {
            debug!("No search results for {:?}", query);
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for link in page.find_elements(imdb::SEARCH_RESULT_LINKS).await? {
            let display_title = match link.inner_text().await? {
                Some(text) => text.trim().to_string(),
                None => continue,
            };
            let Some(href) = link.attribute("href").await? else {
                continue;
            };
            if let Some(url) = absolute_title_url(&href) {
                hits.push(SearchHit { display_title, url });
            }
        }
        Ok(hits)
    }

    async fn fetch_credits_text(&mut self, url: &str) -> Result<String, ExtractError> {
        let page = self.goto(url).await?;
        self.wait_for(imdb::PRINCIPAL_CREDITS).await?;

        let mut parts = Vec::new();
        for block in page.find_elements(imdb::PRINCIPAL_CREDITS).await? {
            if let Some(text) = block.inner_text().await? {
                parts.push(text);
            }
        }
        Ok(parts.join("\n"))
    }

    async fn extract_rating_fields(&mut self, url: &str) -> Result<RatingFields, ExtractError> {
        self.goto(url).await?;
        self.wait_for(imdb::TITLE_HERO).await?;

        Ok(RatingFields {
            rating: self.text_of(imdb::RATING).await?,
            metascore: self.text_of(imdb::METASCORE).await?,
            duration: self.text_of(imdb::DURATION).await?,
        })
    }

    async fn restart(&mut self) -> Result<(), ExtractError> {
        warn!("Restarting browser session");
        self.teardown().await;
        tokio::time::sleep(RESTART_PAUSE).await;
        self.start()
            .await
            .map_err(|e| ExtractError::Restart(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_title_url_strips_query() {
        let href = "/title/tt15239678/?ref_=fn_ttl_1";
        assert_eq!(
            absolute_title_url(href).unwrap(),
            "https://www.imdb.com/title/tt15239678/"
        );
    }

    #[test]
    fn test_absolute_title_url_passes_through_absolute() {
        let href = "https://www.imdb.com/title/tt1160419/";
        assert_eq!(absolute_title_url(href).unwrap(), href);
    }
}
