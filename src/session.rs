use crate::config::BrowserConfig;
use crate::Result;
use eoka::Browser;
use portal_engine::BrowserDriver;
use tracing::debug;

/// One browser with one page, owned by a single run.
pub struct Session {
    browser: Browser,
    driver: BrowserDriver,
}

impl Session {
    /// Launch a browser and open a blank page.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let stealth = eoka::StealthConfig {
            headless: config.headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
            viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            config.headless, config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            driver: BrowserDriver::new(page),
        })
    }

    pub fn driver(&self) -> &BrowserDriver {
        &self.driver
    }

    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}
