mod config_cmd;
mod store_cmd;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use store_cmd::{DeleteCommand, ListCommand, SaveCommand};
pub use sync_cmd::{PullCommand, StatusCommand};

use brainsync::remote::RestRemote;
use brainsync::sync::PullReport;
use brainsync::Persistence;

/// Starts a session as the user behind the configured API key.
///
/// Returns `None` when there is no remote or it cannot be reached; the caller
/// then carries on with local data only.
pub async fn sign_in(persistence: &Persistence, remote: Option<&RestRemote>) -> Option<PullReport> {
    let remote = remote?;
    match remote.whoami().await {
        Ok(user_id) => persistence.set_auth(Some(&user_id)).await,
        Err(e) => {
            tracing::warn!(error = %e, "Could not sign in; changes stay local");
            None
        }
    }
}
