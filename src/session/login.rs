use super::confirm::ConfirmationSignal;
use super::store::SessionStore;
use crate::browser::{navigate_with_retry, BrowserDriver, BrowserLauncher, BrowserMode};
use crate::config::RetryPolicy;
use crate::error::{Result, ScraperError};
use tracing::{info, instrument, warn};

const LOGIN_PROMPT: &str = "\n🔐 Please log in using the browser window.\nPress ENTER when you're logged in and ready to continue...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    CheckSession,
    InteractiveLogin,
    AwaitingUserConfirmation,
    Verifying,
    PersistAndContinue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// A stored session was restored; no visible browser was opened.
    RestoredSession,
    /// The operator logged in through the visible browser.
    LoggedIn,
    /// The visible browser reached the page without hitting a login wall.
    NoLoginRequired,
}

/// A browser positioned on the protected page, in the requested working mode.
pub struct AuthenticatedSession {
    pub browser: Box<dyn BrowserDriver>,
    pub outcome: LoginOutcome,
}

/// Session lifecycle: reuse a stored session when it is valid, otherwise
/// log in interactively, persist the result and drop to the working mode.
pub struct LoginFlow<'a> {
    store: &'a dyn SessionStore,
    launcher: &'a dyn BrowserLauncher,
    signal: &'a dyn ConfirmationSignal,
    retry: RetryPolicy,
    working_mode: BrowserMode,
}

impl<'a> LoginFlow<'a> {
    pub fn new(
        store: &'a dyn SessionStore,
        launcher: &'a dyn BrowserLauncher,
        signal: &'a dyn ConfirmationSignal,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            launcher,
            signal,
            retry,
            working_mode: BrowserMode::Headless,
        }
    }

    /// Mode the browser is left in once authenticated. Headless unless the
    /// operator asked to watch the scrape.
    pub fn with_working_mode(mut self, mode: BrowserMode) -> Self {
        self.working_mode = mode;
        self
    }

    /// Run the flow against `protected_url`. On error any browser opened along
    /// the way has already been closed.
    #[instrument(skip(self))]
    pub async fn establish(&self, protected_url: &str) -> Result<AuthenticatedSession> {
        let mut browser: Option<Box<dyn BrowserDriver>> = None;
        match self.drive(protected_url, &mut browser).await {
            Ok(outcome) => match browser {
                Some(browser) => Ok(AuthenticatedSession { browser, outcome }),
                None => Err(ScraperError::Browser("login flow finished without a browser".into())),
            },
            Err(e) => {
                if let Some(b) = browser.as_mut() {
                    let _ = b.close().await;
                }
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        protected_url: &str,
        slot: &mut Option<Box<dyn BrowserDriver>>,
    ) -> Result<LoginOutcome> {
        let mut state = LoginState::CheckSession;
        let mut prompted = false;

        loop {
            info!("login_state={:?}", state);
            state = match state {
                LoginState::CheckSession => match self.store.load() {
                    Some(saved) => {
                        let browser = slot.insert(self.launcher.launch(self.working_mode).await?);
                        browser.restore_session(&saved).await?;
                        navigate_with_retry(browser.as_mut(), protected_url, &self.retry).await?;

                        if browser.is_login_page().await? {
                            warn!("Stored session was rejected by the site; logging in again");
                            browser.close().await?;
                            *slot = None;
                            LoginState::InteractiveLogin
                        } else {
                            info!("✅ Reusing stored session");
                            return Ok(LoginOutcome::RestoredSession);
                        }
                    }
                    None => {
                        info!("No valid stored session");
                        LoginState::InteractiveLogin
                    }
                },

                LoginState::InteractiveLogin => {
                    let browser = slot.insert(self.launcher.launch(BrowserMode::Visible).await?);
                    navigate_with_retry(browser.as_mut(), protected_url, &self.retry).await?;
                    if browser.is_login_page().await? {
                        LoginState::AwaitingUserConfirmation
                    } else {
                        LoginState::PersistAndContinue
                    }
                }

                LoginState::AwaitingUserConfirmation => {
                    prompted = true;
                    self.signal.wait(LOGIN_PROMPT).await?;
                    LoginState::Verifying
                }

                LoginState::Verifying => {
                    let browser = slot
                        .as_mut()
                        .ok_or_else(|| ScraperError::Browser("no browser to verify login".into()))?;
                    // The site may leave the operator on a landing page after login.
                    navigate_with_retry(browser.as_mut(), protected_url, &self.retry).await?;
                    if browser.is_login_page().await? {
                        return Err(ScraperError::LoginVerificationFailed);
                    }
                    LoginState::PersistAndContinue
                }

                LoginState::PersistAndContinue => {
                    let browser = slot
                        .as_mut()
                        .ok_or_else(|| ScraperError::Browser("no browser to persist".into()))?;
                    let captured = browser.capture_session().await?;
                    if let Err(e) = self.store.save(captured) {
                        warn!("Could not persist session, next run will ask to log in again: {}", e);
                    }
                    browser.switch_mode(self.working_mode).await?;

                    return Ok(if prompted {
                        info!("✅ Logged in");
                        LoginOutcome::LoggedIn
                    } else {
                        LoginOutcome::NoLoginRequired
                    });
                }
            };
        }
    }
}
