use isoflow_demo::{DemoConfig, MarchingCubesApp};
use isoflow_engine::device::GpuInit;
use isoflow_engine::logging::{LoggingConfig, init_logging};
use isoflow_engine::window::Runtime;

fn main() {
    init_logging(LoggingConfig::default());

    let config = DemoConfig::default();
    let runtime_config = config.runtime_config();

    let result = MarchingCubesApp::new(config)
        .and_then(|app| Runtime::run(runtime_config, GpuInit::default(), app));

    if let Err(e) = result {
        log::error!("isoflow demo failed: {e:#}");
        std::process::exit(1);
    }
}
