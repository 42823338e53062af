//! CERTSCAN: trading-card cert valuation scanner
//!
//! Entry point. Loads configuration, initialises logging, obtains
//! credentials, opens the session ledger and runs the interactive
//! paste → scan loop until Ctrl+C or the input closes.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use certscan::clients::images::ImageClient;
use certscan::clients::valuation::ValuationClient;
use certscan::config::AppConfig;
use certscan::console::{Prompter, TerminalPrompter};
use certscan::engine::{ScanSettings, Scanner};
use certscan::ledger::{resolve_ledger_path, Ledger};
use certscan::tokens::env_file;
use certscan::{logging, parser, tokens};

const CONFIG_PATH: &str = "config.toml";
const SCAN_PROMPT: &str = "📦 Paste certs or scan a cert";

const BANNER: &str = r#"
  ____ _____ ____ _____ ____   ____    _    _   _
 / ___| ____|  _ \_   _/ ___| / ___|  / \  | \ | |
| |   |  _| | |_) || | \___ \| |     / _ \ |  \| |
| |___| |___|  _ < | |  ___) | |___ / ___ \| |\  |
 \____|_____|_| \_\|_| |____/ \____/_/   \_\_| \_|

  Cert valuation scanner  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let env_problem = env_file::load_default();

    let cfg = AppConfig::load_or_default(CONFIG_PATH)?;
    logging::init("certscan=warn");

    if let Some(e) = env_problem {
        warn!(error = %e, "Could not fully load .env, keys from the bad line on are missing");
        println!("⚠️ .env could not be fully loaded ({e}). Tokens may need re-entry.");
    }

    println!("{BANNER}");
    info!(
        token_source = ?cfg.tokens.source,
        scans_dir = %cfg.scanner.scans_dir,
        payout_rate = cfg.scanner.payout_rate,
        "CERTSCAN starting up"
    );

    // -- Credentials -----------------------------------------------------

    let prompter: Arc<dyn Prompter> = Arc::new(TerminalPrompter);
    let provider = tokens::build_provider(&cfg, prompter.clone());
    let creds = provider.initial().await.with_context(|| {
        format!("Failed to obtain credentials from the {} token provider", provider.name())
    })?;
    debug!(?creds, "Initial credentials");

    // -- Ledger ----------------------------------------------------------

    let answer = prompter.ask("📁 Enter filename for this scan session (blank for today's date)")?;
    let path = resolve_ledger_path(
        Path::new(&cfg.scanner.scans_dir),
        &answer,
        Local::now().date_naive(),
    );
    let ledger = Ledger::open(&path)?;

    // -- Scanner ---------------------------------------------------------

    let valuation = ValuationClient::new(&cfg.valuation)?;
    let images = ImageClient::new(&cfg.images)?;
    let settings = ScanSettings::from_config(&cfg.scanner)?;
    let mut scanner = Scanner::new(
        Box::new(valuation),
        Box::new(images),
        provider,
        ledger,
        creds,
        settings,
    );

    println!("\n✅ Ready to start scanning into {}!\n", path.display());

    // -- Prompt loop -----------------------------------------------------

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut interrupted = false;

    loop {
        let read = tokio::task::spawn_blocking(|| TerminalPrompter.ask(SCAN_PROMPT));

        let line = tokio::select! {
            joined = read => match joined {
                Ok(Ok(line)) => line,
                Ok(Err(e)) => {
                    info!(error = %e, "Input closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Prompt task failed");
                    break;
                }
            },
            _ = &mut shutdown => {
                interrupted = true;
                break;
            }
        };

        let certs = parser::parse_certs(&line);
        if certs.is_empty() {
            println!("⚠️ No valid certs detected. Try again.");
            continue;
        }
        println!("\n🔍 Detected {} cert(s)\n", certs.len());

        let result = tokio::select! {
            r = scanner.run_batch(&certs) => r,
            _ = &mut shutdown => {
                interrupted = true;
                break;
            }
        };

        match result {
            Ok(report) => println!("\n🎯 {report}\n"),
            Err(e) => {
                warn!(error = %e, "Batch stopped");
                println!("\n❌ {e}. Rows written so far are kept; paste the remaining certs to retry.\n");
            }
        }
    }

    info!(
        ledger = %scanner.ledger().path().display(),
        rows = scanner.ledger().rows_written(),
        "CERTSCAN shut down cleanly."
    );
    println!(
        "\n👋 {} row(s) saved to {}",
        scanner.ledger().rows_written(),
        scanner.ledger().path().display()
    );

    if interrupted {
        // A pending stdin read cannot be cancelled and would hold the
        // runtime open. Every row is already flushed.
        drop(scanner);
        std::process::exit(0);
    }
    Ok(())
}
