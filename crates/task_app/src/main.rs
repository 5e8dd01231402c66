use task_app::{app::run, config::AppConfig};

fn main() {
    tracing_subscriber::fmt::init();
    let config = AppConfig::from_env().unwrap_or_default();
    if let Err(err) = run(config) {
        eprintln!("task_worker failed: {err:#}");
        std::process::exit(1);
    }
}
