//! Admin panel report collector.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::{Host, Url};

use super::webdriver::{Element, KEY_ENTER, Locator, WebDriverSession};
use super::{CollectionReport, CollectorError, ReportCollector};
use crate::config::AdminPanelConfig;
use crate::database::JsonFile;

const ELEMENT_TIMEOUT: Duration = Duration::from_secs(15);
const PASSWORD_TIMEOUT: Duration = Duration::from_secs(30);
const LOGIN_REDIRECT_TIMEOUT: Duration = Duration::from_secs(30);
const SCRIPT_LOAD_ATTEMPTS: u32 = 30;

const SEARCH_EVENTS_JS: &str = r#"
    var field = arguments[0];
    if (arguments.length > 1) { field.value = arguments[1]; }
    ['input', 'keyup', 'change'].forEach(function (name) {
        field.dispatchEvent(new Event(name, { bubbles: true }));
    });
    if (typeof so_filter_collections === 'function') { so_filter_collections(); }
"#;

/// Collects reports by driving a browser through the admin panel.
pub struct AdminPanelCollector {
    config: AdminPanelConfig,
    cookies: JsonFile<Vec<Value>>,
    /// Base for the collection link put into reports.
    link_base: String,
    /// Registrable domain of `ADMIN_URL`, e.g. `mosaica.ai`.
    site: Option<String>,
    /// One browser session at a time.
    session_lock: Mutex<()>,
}

impl AdminPanelCollector {
    pub fn new(config: AdminPanelConfig, cookies_file: PathBuf, link_base: &str) -> Self {
        let site = panel_site(&config.base_url);
        if site.is_none() {
            warn!("ADMIN_URL {} has no host, saved cookies will not be reused", config.base_url);
        }
        Self {
            config,
            site,
            cookies: JsonFile::new(cookies_file),
            link_base: link_base.trim_end_matches('/').to_string(),
            session_lock: Mutex::new(()),
        }
    }

    async fn run(
        &self,
        session: &WebDriverSession,
        collection_id: &str,
        (email, password): (&str, &str),
    ) -> Result<CollectionReport, CollectorError> {
        self.login(session, email, password).await?;
        self.open_collections(session).await?;
        self.search(session, collection_id).await?;
        self.open_edit_form(session, collection_id).await?;
        let raw = self.read_stats(session).await?;

        let url = format!("{}/{}", self.link_base, collection_id);
        Ok(CollectionReport::new(collection_id, url, &raw))
    }

    // --- Login ---

    async fn login(&self, session: &WebDriverSession, email: &str, password: &str) -> Result<(), CollectorError> {
        info!("Logging in to the admin panel...");

        if self.restore_cookies(session).await? {
            info!("Logged in with saved cookies");
            return Ok(());
        }

        session.goto(&self.config.base_url).await?;
        sleep(Duration::from_secs(2)).await;
        if self.is_logged_in(&session.current_url().await?) {
            self.save_cookies(session).await;
            return Ok(());
        }

        let login_button = session
            .wait_for_any(
                &[
                    Locator::css("a.link-over"),
                    Locator::xpath(r#"//a[contains(text(), "Please, Login")]"#),
                    Locator::xpath(r#"//a[contains(@onclick, "login")]"#),
                ],
                ELEMENT_TIMEOUT,
            )
            .await
            .map_err(|_| CollectorError::Login("login button not found".into()))?;

        if let Err(e) = session.execute("login();", vec![]).await {
            debug!("login() not callable ({}), clicking the button", e);
            session.click(&login_button).await?;
        }
        sleep(Duration::from_secs(5)).await;

        let url = session.current_url().await?;
        if self.is_logged_in(&url) {
            info!("Automatic login successful");
            self.save_cookies(session).await;
            return Ok(());
        }
        if !url.to_lowercase().contains("accounts.google.com") {
            return Err(CollectorError::Login(format!("unexpected page {url}")));
        }

        self.google_sign_in(session, email, password).await?;
        self.save_cookies(session).await;
        Ok(())
    }

    async fn google_sign_in(
        &self,
        session: &WebDriverSession,
        email: &str,
        password: &str,
    ) -> Result<(), CollectorError> {
        info!("On Google sign-in page, entering credentials");

        let email_field = session
            .wait_for_any(
                &[
                    Locator::css(r#"input[type="email"]"#),
                    Locator::css("#identifierId"),
                ],
                ELEMENT_TIMEOUT,
            )
            .await
            .map_err(|_| CollectorError::Login("email field not found".into()))?;
        session.clear(&email_field).await?;
        session.send_keys(&email_field, email).await?;
        self.press_next(session, &email_field).await?;
        sleep(Duration::from_secs(3)).await;

        let password_field = session
            .wait_for_any(
                &[
                    Locator::css(r#"input[type="password"]"#),
                    Locator::css(r#"input[name="Passwd"]"#),
                ],
                PASSWORD_TIMEOUT,
            )
            .await
            .map_err(|_| CollectorError::Login("password field not found".into()))?;
        session.send_keys(&password_field, password).await?;
        self.press_next(session, &password_field).await?;

        let deadline = tokio::time::Instant::now() + LOGIN_REDIRECT_TIMEOUT;
        loop {
            let url = session.current_url().await?;
            if self.is_logged_in(&url) {
                info!("Google sign-in successful");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CollectorError::Login(format!("still on {url} after sign-in")));
            }
            sleep(Duration::from_secs(1)).await;
        }
    }

    async fn press_next(&self, session: &WebDriverSession, field: &Element) -> Result<(), CollectorError> {
        let next = Locator::xpath(r#"//button[contains(., "Далее") or contains(., "Next")]"#);
        match session.find(&next).await? {
            Some(button) => session.click(&button).await?,
            None => session.send_keys(field, KEY_ENTER).await?,
        }
        sleep(Duration::from_secs(2)).await;
        Ok(())
    }

    /// Apply saved cookies and report whether they yield a session.
    async fn restore_cookies(&self, session: &WebDriverSession) -> Result<bool, CollectorError> {
        let cookies = match self.cookies.load().await {
            Ok(Some(cookies)) if !cookies.is_empty() => cookies,
            Ok(_) => return Ok(false),
            Err(e) => {
                warn!("Could not read saved cookies: {}", e);
                return Ok(false);
            }
        };

        let Some(site) = self.site.as_deref() else {
            return Ok(false);
        };
        session.goto(&self.config.base_url).await?;
        sleep(Duration::from_secs(2)).await;

        let domain = cookie_domain(site);
        let mut applied = 0;
        for cookie in cookies {
            if session.add_cookie(prepare_cookie(cookie, &domain)).await.is_ok() {
                applied += 1;
            }
        }
        debug!("Applied {} saved cookies", applied);

        session.refresh().await?;
        sleep(Duration::from_secs(3)).await;

        Ok(self.is_logged_in(&session.current_url().await?))
    }

    async fn save_cookies(&self, session: &WebDriverSession) {
        let cookies = match session.cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!("Could not read browser cookies: {}", e);
                return;
            }
        };
        match self.cookies.save(&cookies).await {
            Ok(()) => info!("Saved {} cookies", cookies.len()),
            Err(e) => warn!("Could not save cookies: {}", e),
        }
    }

    fn is_logged_in(&self, url: &str) -> bool {
        self.site
            .as_deref()
            .is_some_and(|site| is_panel_page(url, site))
    }

    // --- Collection page ---

    async fn open_collections(&self, session: &WebDriverSession) -> Result<(), CollectorError> {
        info!("Opening Showoff collections...");

        let mut ready = false;
        for _ in 0..SCRIPT_LOAD_ATTEMPTS {
            let state = session.execute("return document.readyState;", vec![]).await?;
            let has_view = session
                .execute("return typeof view_custom_collections === 'function';", vec![])
                .await?;
            if state == "complete" && has_view == Value::Bool(true) {
                ready = true;
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }

        if ready {
            session.execute("view_custom_collections();", vec![]).await?;
            sleep(Duration::from_secs(5)).await;
        } else {
            warn!("view_custom_collections() not found, using the collections hash route");
            session
                .execute("window.location.hash = '#/collections';", vec![])
                .await?;
            sleep(Duration::from_secs(3)).await;
        }

        let url = session.current_url().await?;
        if self.is_logged_in(&url) {
            Ok(())
        } else {
            Err(CollectorError::Navigation(url))
        }
    }

    async fn search(&self, session: &WebDriverSession, collection_id: &str) -> Result<(), CollectorError> {
        let field = session
            .wait_for(&Locator::css("#so_search_coll_name"), ELEMENT_TIMEOUT)
            .await
            .map_err(|_| CollectorError::Navigation("search field not found".into()))?;

        session
            .execute("arguments[0].scrollIntoView({block: 'center'});", vec![field.as_arg()])
            .await?;
        session.clear(&field).await?;
        session.send_keys(&field, collection_id).await?;

        let entered = session.property(&field, "value").await?;
        if entered.as_deref() == Some(collection_id) {
            session.execute(SEARCH_EVENTS_JS, vec![field.as_arg()]).await?;
        } else {
            debug!("Search field holds {:?}, setting it from script", entered);
            session
                .execute(SEARCH_EVENTS_JS, vec![field.as_arg(), json!(collection_id)])
                .await?;
        }

        sleep(Duration::from_secs(3)).await;
        Ok(())
    }

    async fn open_edit_form(&self, session: &WebDriverSession, collection_id: &str) -> Result<(), CollectorError> {
        let exact = Locator::css(format!(r#"li[data-id="{collection_id}"]"#));
        let item = match session.wait_for(&exact, ELEMENT_TIMEOUT).await {
            Ok(item) => item,
            Err(_) => {
                let prefix: String = collection_id.chars().take(8).collect();
                let partial = Locator::css(format!(r#"li[data-id^="{prefix}"]"#));
                session
                    .wait_for(&partial, Duration::from_secs(5))
                    .await
                    .map_err(|_| CollectorError::NotFound(collection_id.to_string()))?
            }
        };

        let edit_id = format!("so_coll_edit_button_{collection_id}");
        let mut button = session
            .find_within(&item, &Locator::css(format!("#{edit_id}")))
            .await?;
        if button.is_none() {
            button = session
                .find_within(&item, &Locator::css(r#"button[id^="so_coll_edit_button"]"#))
                .await?;
        }

        match button {
            Some(button) => {
                session
                    .execute("arguments[0].scrollIntoView({block: 'center'});", vec![button.as_arg()])
                    .await?;
                sleep(Duration::from_millis(500)).await;
                if let Err(e) = session.click(&button).await {
                    debug!("Native click failed ({}), clicking from script", e);
                    session
                        .execute("arguments[0].click();", vec![button.as_arg()])
                        .await?;
                }
            }
            None => {
                warn!("Edit button for {} not found, drawing items from script", collection_id);
                session
                    .execute(
                        "so_draw_blocks('draw_collection_items', arguments[0]);",
                        vec![json!(collection_id)],
                    )
                    .await?;
            }
        }

        sleep(Duration::from_secs(2)).await;
        Ok(())
    }

    async fn read_stats(&self, session: &WebDriverSession) -> Result<String, CollectorError> {
        let textarea = session
            .wait_for(&Locator::css("#so_coll_stat"), ELEMENT_TIMEOUT)
            .await
            .map_err(|_| CollectorError::Navigation("stats field not found".into()))?;

        let value = session
            .property(&textarea, "value")
            .await?
            .filter(|v| !v.trim().is_empty());
        let text = match value {
            Some(value) => value,
            None => session.text(&textarea).await?,
        };

        debug!("Stats field: {} chars", text.len());
        Ok(text)
    }
}

#[async_trait]
impl ReportCollector for AdminPanelCollector {
    async fn collect(&self, collection_id: &str) -> Result<CollectionReport, CollectorError> {
        let credentials = self
            .config
            .credentials()
            .ok_or(CollectorError::MissingCredentials)?;
        if !is_safe_id(collection_id) {
            return Err(CollectorError::NotFound(collection_id.to_string()));
        }

        let _session_guard = self.session_lock.lock().await;
        info!("Collecting report for {}", collection_id);

        let session = WebDriverSession::start(&self.config.webdriver_url, self.config.headless).await?;
        let result = self.run(&session, collection_id, credentials).await;

        if let Err(e) = session.delete().await {
            warn!("Failed to close browser session: {}", e);
        }

        match &result {
            Ok(report) => info!(
                "Report for {} collected (total done items: {:?})",
                collection_id, report.stats.total_done_items
            ),
            Err(e) => warn!("Report for {} failed: {}", collection_id, e),
        }
        result
    }
}

/// Ids are interpolated into selectors.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Registrable part of a host (`sandbox-prod.mosaica.ai` -> `mosaica.ai`).
///
/// IP hosts are kept whole.
fn site_of(host: Host<&str>) -> String {
    match host {
        Host::Domain(domain) => {
            let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
            let start = labels.len().saturating_sub(2);
            labels[start..].join(".").to_lowercase()
        }
        Host::Ipv4(addr) => addr.to_string(),
        Host::Ipv6(addr) => addr.to_string(),
    }
}

fn panel_site(base_url: &str) -> Option<String> {
    let url = Url::parse(base_url).ok()?;
    url.host().map(site_of)
}

/// Cookie `domain` attribute covering every host of the site.
fn cookie_domain(site: &str) -> String {
    if site.contains('.') && site.parse::<std::net::IpAddr>().is_err() {
        format!(".{site}")
    } else {
        site.to_string()
    }
}

/// Whether `current_url` is an authenticated panel page rather than a login screen.
fn is_panel_page(current_url: &str, site: &str) -> bool {
    let Ok(url) = Url::parse(current_url) else {
        return false;
    };
    let on_site = url.host().is_some_and(|host| site_of(host) == site);
    let route = format!("{}#{}", url.path(), url.fragment().unwrap_or_default()).to_lowercase();
    on_site && !route.contains("login")
}

/// Whether a cookie's `domain` attribute belongs to `site`.
fn cookie_belongs_to(cookie_domain: &str, site: &str) -> bool {
    let bare = cookie_domain.trim_start_matches('.').to_lowercase();
    bare == site || bare.ends_with(&format!(".{site}"))
}

/// Strip fields chromedriver rejects and move foreign cookies onto the panel domain.
fn prepare_cookie(mut cookie: Value, domain: &str) -> Value {
    if let Some(fields) = cookie.as_object_mut() {
        fields.remove("sameSite");
        fields.remove("expiry");
        let site = domain.trim_start_matches('.');
        let foreign = fields
            .get("domain")
            .and_then(Value::as_str)
            .is_some_and(|d| !cookie_belongs_to(d, site));
        if foreign {
            fields.insert("domain".into(), json!(domain));
        }
    }
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_site() {
        assert_eq!(panel_site("https://sandbox-prod.mosaica.ai").as_deref(), Some("mosaica.ai"));
        assert_eq!(panel_site("http://localhost:8080/admin").as_deref(), Some("localhost"));
        // Credentials and ports are not part of the host
        assert_eq!(
            panel_site("https://admin:pw@sandbox-prod.mosaica.ai:8443/").as_deref(),
            Some("mosaica.ai")
        );
        assert_eq!(panel_site("http://[::1]:8080/").as_deref(), Some("::1"));
        assert_eq!(panel_site("not a url"), None);
    }

    #[test]
    fn test_cookie_domain() {
        assert_eq!(cookie_domain("mosaica.ai"), ".mosaica.ai");
        assert_eq!(cookie_domain("localhost"), "localhost");
        assert_eq!(cookie_domain("127.0.0.1"), "127.0.0.1");
        assert_eq!(cookie_domain("::1"), "::1");
    }

    #[test]
    fn test_is_panel_page() {
        assert!(is_panel_page("https://sandbox-prod.mosaica.ai/#/collections", "mosaica.ai"));
        assert!(is_panel_page("https://mosaica.ai/", "mosaica.ai"));
        assert!(!is_panel_page("https://sandbox-prod.mosaica.ai/login", "mosaica.ai"));
        assert!(!is_panel_page("https://sandbox-prod.mosaica.ai/#/login", "mosaica.ai"));
        assert!(!is_panel_page(
            "https://accounts.google.com/signin?continue=mosaica.ai",
            "mosaica.ai"
        ));
        // The site name in a query string does not count
        assert!(!is_panel_page("https://tracker.example.com/?ref=mosaica.ai", "mosaica.ai"));
        assert!(!is_panel_page("https://notmosaica.ai/", "mosaica.ai"));
        assert!(!is_panel_page("about:blank", "mosaica.ai"));
    }

    #[test]
    fn test_prepare_cookie() {
        let cookie = json!({
            "name": "SID", "value": "x", "domain": ".google.com",
            "sameSite": "Lax", "expiry": 1
        });
        let prepared = prepare_cookie(cookie, ".mosaica.ai");
        assert_eq!(prepared["domain"], ".mosaica.ai");
        assert!(prepared.get("sameSite").is_none());
        assert!(prepared.get("expiry").is_none());

        let own = prepare_cookie(json!({"name": "s", "domain": "sandbox-prod.mosaica.ai"}), ".mosaica.ai");
        assert_eq!(own["domain"], "sandbox-prod.mosaica.ai");

        let lookalike = prepare_cookie(json!({"name": "s", "domain": "notmosaica.ai"}), ".mosaica.ai");
        assert_eq!(lookalike["domain"], ".mosaica.ai");
    }

    #[test]
    fn test_safe_ids() {
        assert!(is_safe_id("0f8fad5b-d9cb-469f-a165-70867728950e"));
        assert!(!is_safe_id(r#"x"] , li[data-id"#));
        assert!(!is_safe_id(""));
    }

    #[tokio::test]
    async fn test_collect_requires_credentials() {
        let config = AdminPanelConfig {
            base_url: "https://sandbox-prod.mosaica.ai".into(),
            email: None,
            password: None,
            webdriver_url: "http://localhost:9515".into(),
            headless: true,
        };
        let dir = tempfile::tempdir().unwrap();
        let collector = AdminPanelCollector::new(config, dir.path().join("cookies.json"), "https://x/collection");

        let err = collector.collect("abc").await.unwrap_err();
        assert!(matches!(err, CollectorError::MissingCredentials));
    }
}
