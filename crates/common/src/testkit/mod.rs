/// Lightweight harness for driving an app session in tests
///
/// Spins up an in-process [`LocalNative`] library and opens one app
/// session against it, so integration tests can exercise the full
/// request/callback path without external infrastructure.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestApp;
///
/// #[tokio::test]
/// async fn test_sign() -> anyhow::Result<()> {
///     let test = TestApp::new()?;
///     let crypto = test.app().crypto();
///
///     let pair = crypto.generate_sign_key_pair().await?;
///     let signed = crypto.sign(&pair.secret, b"hello").await?;
///     assert_eq!(crypto.verify(&pair.public, &signed).await?, b"hello");
///
///     drop(pair);
///     test.wait_for_baseline().await?;
///     Ok(())
/// }
/// ```
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::app::App;
use crate::config::Config;
use crate::native::{AppHandle, LocalNative, NativeCrypto};

/// Install a compact fmt subscriber for tests
///
/// `RUST_LOG` overrides `level`. Safe to call from every test, only the
///  first call installs anything.
pub fn init_tracing(level: tracing::Level) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_test_writer()
        .with_filter(env_filter);

    let _ = tracing_subscriber::registry().with(layer).try_init();
}

/// An app session over a private local native library
pub struct TestApp {
    native: Arc<LocalNative>,
    app: App,
    baseline: usize,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        init_tracing(config.log_level);

        let native = Arc::new(LocalNative::new(&config)?);
        let handle = native.register_app()?;
        let app = App::new(handle, native.clone() as Arc<dyn NativeCrypto>);
        let baseline = native
            .live_handles(handle)
            .ok_or_else(|| anyhow!("app {} has no session", handle))?;

        Ok(Self {
            native,
            app,
            baseline,
        })
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn handle(&self) -> AppHandle {
        self.app.handle()
    }

    pub fn native(&self) -> &LocalNative {
        &self.native
    }

    /// Live native handles of this session
    pub fn live_handles(&self) -> usize {
        self.native.live_handles(self.handle()).unwrap_or(0)
    }

    /// Callbacks of this session still waiting for the native library
    pub fn pending_callbacks(&self) -> usize {
        self.app.registry().len()
    }

    /// Wait until every handle created since startup has been freed and no
    ///  callback is pending
    ///
    /// Frees are fire-and-forget, so they settle shortly after the owning
    ///  handles are dropped.
    pub async fn wait_for_baseline(&self) -> Result<()> {
        self.wait_for_live_handles(self.baseline).await
    }

    pub async fn wait_for_live_handles(&self, expected: usize) -> Result<()> {
        let settle = async {
            while self.live_handles() != expected || self.pending_callbacks() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), settle)
            .await
            .map_err(|_| {
                anyhow!(
                    "session did not settle: {} live handles (expected {}), {} pending callbacks",
                    self.live_handles(),
                    expected,
                    self.pending_callbacks()
                )
            })
    }
}
