use anyhow::Context;
use clap::Parser;
use parcel_dxf::utils::error::{ErrorSeverity, GeoError};
use parcel_dxf::utils::{logger, validation::Validate};
use parcel_dxf::{
    CliConfig, LocalStorage, ParcelEngine, ParcelPipeline, ServicesConfig, UldkClient,
};
use parcel_dxf::domain::ports::ConfigProvider;

/// Any error that reaches `main` ended the run without a drawing, so the
/// code is never 0.
fn exit_code(e: &GeoError) -> i32 {
    // 根據錯誤嚴重程度決定退出碼
    match e.severity() {
        ErrorSeverity::Low | ErrorSeverity::High => 1,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::Critical => 3,
    }
}

fn fail(e: &GeoError) -> ! {
    tracing::error!(
        "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(exit_code(e));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI config: {:?}", cli);

    let request = match cli.parcel_request() {
        Ok(request) => request,
        Err(e) => fail(&e),
    };

    let services = match &cli.config {
        Some(path) => match ServicesConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => fail(&e),
        },
        None => ServicesConfig::default(),
    }
    .with_overrides(cli.concurrent_requests, cli.timeout_seconds);

    if let Err(e) = services.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        fail(&e);
    }

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("parcel-dxf/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;
    let lookup = UldkClient::new(
        client.clone(),
        services.parcel_lookup_endpoint(),
        services.request_timeout(),
    );
    let storage = LocalStorage::new(request.output_dir.clone());
    let pipeline = ParcelPipeline::with_client(storage, lookup, services, client);
    let engine = ParcelEngine::new_with_monitoring(pipeline, cli.monitor);

    match engine.run(request).await {
        Ok(report) => {
            if cli.json {
                println!("{}", report.to_json().context("serializing run report")?);
            } else {
                println!("✅ DXF created successfully!");
                println!("{}", report.summary());
            }
        }
        Err(e) => fail(&e),
    }

    Ok(())
}
