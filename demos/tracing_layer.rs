use tracing::{error, info, info_span};

use correlated_json_log::init::init_tracing;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Reads DD_ENV / DD_SERVICE / DD_VERSION, LOG_PROGNAME and LOG_LEVEL.
    init_tracing()?;

    info!("starting service");

    let span = info_span!("checkout", cart_id = 9);
    let _guard = span.enter();
    error!(user_id = 42, reason = "card declined", "payment failed");

    Ok(())
}
