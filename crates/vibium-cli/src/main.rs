use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use vibium::browser::{self, LaunchOptions, LaunchedBrowser};
use vibium::{actionability, actions, BidiClient, Result, Transport, WaitOptions, WsTransport};
use vibium_proxy::{Router, Server};

#[derive(Parser)]
#[command(name = "vibium")]
#[command(about = "Browser automation for AI agents and humans")]
#[command(version)]
struct Cli {
    /// Show browser window (not headless)
    #[arg(long, global = true)]
    headed: bool,

    /// Seconds to wait after navigation for page to load
    #[arg(long, global = true, value_name = "SECONDS", default_value_t = 0)]
    wait_open: u64,

    /// Seconds to keep browser open before closing
    #[arg(long, global = true, value_name = "SECONDS", default_value_t = 0)]
    wait_close: u64,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the version number
    Version,

    /// Print browser and cache paths
    Paths,

    /// Download Chrome for Testing and chromedriver
    Install,

    /// Launch browser via chromedriver and print the BiDi WebSocket URL
    LaunchTest,

    /// Launch browser, connect via BiDi, send session.status
    BidiTest,

    /// Test a WebSocket connection (type messages, see replies)
    WsTest { url: String },

    /// Navigate to a URL and print page info
    Navigate { url: String },

    /// Navigate to a URL and capture a screenshot
    Screenshot {
        url: String,
        /// Output file path
        #[arg(short, long, default_value = "screenshot.png")]
        output: PathBuf,
    },

    /// Navigate to a URL and evaluate a JavaScript expression
    Eval { url: String, expression: String },

    /// Navigate to a URL and find an element by CSS selector
    Find { url: String, selector: String },

    /// Navigate to a URL and click an element (with actionability checks)
    Click {
        url: String,
        selector: String,
        /// Timeout for actionability checks (e.g. 5s, 30s)
        #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
        timeout: Duration,
    },

    /// Navigate to a URL, click an element, and type text (with actionability checks)
    Type {
        url: String,
        selector: String,
        text: String,
        /// Timeout for actionability checks (e.g. 5s, 30s)
        #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
        timeout: Duration,
    },

    /// Check actionability of an element (Visible, Stable, ReceivesEvents, Enabled, Editable)
    CheckActionable { url: String, selector: String },

    /// Start the WebSocket proxy server for browser automation
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 9515)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    match &cli.command {
        Command::Version => {
            println!("Vibium v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Paths => paths_cmd(),
        Command::Install => install_cmd().await,
        Command::LaunchTest => launch_test_cmd(cli.headed).await,
        Command::BidiTest => bidi_test_cmd(cli.wait_close).await,
        Command::WsTest { url } => ws_test_cmd(url).await,
        Command::Navigate { url } => navigate_cmd(&cli, url).await,
        Command::Screenshot { url, output } => screenshot_cmd(&cli, url, output).await,
        Command::Eval { url, expression } => eval_cmd(&cli, url, expression).await,
        Command::Find { url, selector } => find_cmd(&cli, url, selector).await,
        Command::Click { url, selector, timeout } => {
            click_cmd(&cli, url, selector, *timeout).await
        }
        Command::Type { url, selector, text, timeout } => {
            type_cmd(&cli, url, selector, text, *timeout).await
        }
        Command::CheckActionable { url, selector } => {
            check_actionable_cmd(&cli, url, selector).await
        }
        Command::Serve { port } => serve_cmd(*port, cli.headed).await,
    }
}

/// Launch a browser and open a BiDi client to it.
async fn open_browser(headed: bool) -> Result<(LaunchedBrowser, BidiClient)> {
    println!("Launching browser...");
    let browser = browser::launch(LaunchOptions { headless: !headed }).await?;
    println!("Connecting to BiDi...");
    let transport = WsTransport::connect(browser.websocket_url()).await?;
    Ok((browser, BidiClient::new(Arc::new(transport))))
}

/// Navigate and honor `--wait-open`.
async fn goto(cli: &Cli, client: &BidiClient, url: &str) -> Result<String> {
    let context = actions::resolve_context(client, None).await?;
    println!("Navigating to {url}...");
    actions::navigate(client, &context, url).await?;
    if cli.wait_open > 0 {
        println!("Waiting {} seconds for page to load...", cli.wait_open);
        tokio::time::sleep(Duration::from_secs(cli.wait_open)).await;
    }
    Ok(context)
}

/// Honor `--wait-close`, then tear the browser down.
async fn wait_and_close(mut browser: LaunchedBrowser, wait_close: u64) {
    if wait_close > 0 {
        println!("\nKeeping browser open for {wait_close} seconds...");
        tokio::time::sleep(Duration::from_secs(wait_close)).await;
    }
    browser.close().await;
}

fn print_check(name: &str, passed: bool) {
    if passed {
        println!("✓ {name}: true");
    } else {
        println!("✗ {name}: false");
    }
}

fn paths_cmd() -> Result<()> {
    match browser::paths::cache_dir() {
        Ok(dir) => println!("Cache directory: {}", dir.display()),
        Err(e) => println!("Cache directory: error: {e}"),
    }
    match browser::paths::chrome_executable() {
        Ok(path) => println!("Chrome: {}", path.display()),
        Err(_) => println!("Chrome: not found"),
    }
    match browser::paths::chromedriver_path() {
        Ok(path) => println!("Chromedriver: {}", path.display()),
        Err(_) => println!("Chromedriver: not found"),
    }
    Ok(())
}

async fn install_cmd() -> Result<()> {
    let result = browser::install().await?;
    println!("Installation complete!");
    println!("Chrome: {}", result.chrome_path.display());
    println!("Chromedriver: {}", result.chromedriver_path.display());
    println!("Version: {}", result.version);
    Ok(())
}

async fn launch_test_cmd(headed: bool) -> Result<()> {
    let mut browser = browser::launch(LaunchOptions { headless: !headed }).await?;
    println!("Session ID: {}", browser.session_id());
    println!("BiDi WebSocket: {}", browser.websocket_url());
    println!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;
    browser.close().await;
    Ok(())
}

async fn bidi_test_cmd(wait_close: u64) -> Result<()> {
    println!("[1/5] Launching chromedriver...");
    let browser = browser::launch(LaunchOptions { headless: true }).await?;
    println!("       Chromedriver started on port {}", browser.port());
    println!("       Session ID: {}", browser.session_id());

    println!("[2/5] WebDriver session created with BiDi enabled");
    println!("       WebSocket URL: {}", browser.websocket_url());

    println!("[3/5] Connecting to BiDi WebSocket...");
    let transport = WsTransport::connect(browser.websocket_url()).await?;
    println!("       Connected!");

    println!("[4/5] Sending BiDi command: session.status");
    let client = BidiClient::new(Arc::new(transport));
    let status = client.session_status().await?;

    println!("[5/5] Parsed response:");
    println!("       Ready: {}", status.ready);
    println!("       Message: {}", status.message);

    println!("\nTest complete!");
    wait_and_close(browser, wait_close).await;
    Ok(())
}

async fn ws_test_cmd(url: &str) -> Result<()> {
    println!("Connecting to {url}...");
    let transport = Arc::new(WsTransport::connect(url).await?);
    println!("Connected! Type messages (Ctrl+C to quit):");

    let reader = transport.clone();
    tokio::spawn(async move {
        loop {
            match reader.receive().await {
                Ok(msg) => println!("< {msg}"),
                Err(_) => return,
            }
        }
    });

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Err(e) = transport.send(&line).await {
            eprintln!("Send error: {e}");
            break;
        }
        println!("> {line}");
    }
    Ok(())
}

async fn navigate_cmd(cli: &Cli, url: &str) -> Result<()> {
    let (browser, client) = open_browser(cli.headed).await?;
    let context = actions::resolve_context(&client, None).await?;
    println!("Navigating to {url}...");
    let result = actions::navigate(&client, &context, url).await?;
    println!("Navigation complete!");
    println!("  URL: {}", result.url);
    println!("  Navigation ID: {}", result.navigation.unwrap_or_default());
    wait_and_close(browser, cli.wait_close).await;
    Ok(())
}

async fn screenshot_cmd(cli: &Cli, url: &str, output: &PathBuf) -> Result<()> {
    let (browser, client) = open_browser(cli.headed).await?;
    let context = goto(cli, &client, url).await?;

    println!("Capturing screenshot...");
    let png = actions::screenshot(&client, &context).await?;
    std::fs::write(output, &png)?;
    println!("Screenshot saved to {} ({} bytes)", output.display(), png.len());

    wait_and_close(browser, cli.wait_close).await;
    Ok(())
}

async fn eval_cmd(cli: &Cli, url: &str, expression: &str) -> Result<()> {
    let (browser, client) = open_browser(cli.headed).await?;
    let context = goto(cli, &client, url).await?;

    println!("Evaluating: {expression}");
    let value = actions::evaluate(&client, &context, expression).await?;
    match value {
        Value::String(s) => println!("Result: {s}"),
        other => println!("Result: {other}"),
    }

    wait_and_close(browser, cli.wait_close).await;
    Ok(())
}

async fn find_cmd(cli: &Cli, url: &str, selector: &str) -> Result<()> {
    let (browser, client) = open_browser(cli.headed).await?;
    let context = goto(cli, &client, url).await?;

    println!("Finding element: {selector}");
    let info = actions::find_element(&client, &context, selector).await?;
    println!(
        "Found: tag={}, text=\"{}\", box={{x:{:.0}, y:{:.0}, w:{:.0}, h:{:.0}}}",
        info.tag, info.text, info.bbox.x, info.bbox.y, info.bbox.width, info.bbox.height
    );

    wait_and_close(browser, cli.wait_close).await;
    Ok(())
}

async fn click_cmd(cli: &Cli, url: &str, selector: &str, timeout: Duration) -> Result<()> {
    let (browser, client) = open_browser(cli.headed).await?;
    let context = goto(cli, &client, url).await?;

    println!("Waiting for element to be actionable: {selector}");
    let opts = WaitOptions::with_timeout(timeout);
    actions::click(&client, &context, selector, opts).await?;

    // TODO: replace the sleep with a navigation wait driven by BiDi
    // browsingContext events.
    println!("Waiting for navigation...");
    tokio::time::sleep(Duration::from_secs(1)).await;

    let current = actions::current_url(&client, &context).await?;
    println!("Click complete! Current URL: {current}");

    wait_and_close(browser, cli.wait_close).await;
    Ok(())
}

async fn type_cmd(
    cli: &Cli,
    url: &str,
    selector: &str,
    text: &str,
    timeout: Duration,
) -> Result<()> {
    let (browser, client) = open_browser(cli.headed).await?;
    let context = goto(cli, &client, url).await?;

    println!("Waiting for element to be actionable: {selector}");
    let opts = WaitOptions::with_timeout(timeout);
    actions::type_text(&client, &context, selector, text, opts).await?;

    let value = actions::element_value(&client, &context, selector).await?;
    println!("Typed \"{text}\", value is now: {value}");

    wait_and_close(browser, cli.wait_close).await;
    Ok(())
}

async fn check_actionable_cmd(cli: &Cli, url: &str, selector: &str) -> Result<()> {
    let (browser, client) = open_browser(cli.headed).await?;
    let context = goto(cli, &client, url).await?;

    println!("\nChecking actionability for selector: {selector}");
    let result = actionability::check_all(&client, &context, selector).await?;
    print_check("Visible", result.visible);
    print_check("Stable", result.stable);
    print_check("ReceivesEvents", result.receives_events);
    print_check("Enabled", result.enabled);
    print_check("Editable", result.editable);

    wait_and_close(browser, cli.wait_close).await;
    Ok(())
}

async fn serve_cmd(port: u16, headed: bool) -> Result<()> {
    println!("Starting Vibium proxy server on port {port}...");

    let router = Arc::new(Router::new(!headed));
    let server = Arc::new(Server::bind(port, router).await?);
    println!("Server listening on ws://localhost:{}", server.local_addr()?.port());
    println!("Press Ctrl+C to stop...");

    let accept = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    server.stop(Duration::from_secs(5)).await;
    accept.abort();
    Ok(())
}
