use std::time::Duration;

use clap::Parser;
use gpu::HeadlessDevice;
use tracing::info;
use tracing_subscriber::EnvFilter;
use viewer::{Cli, FrameLoop, ViewerConfig, build_source};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ViewerConfig::load(&cli)?;

    let source = build_source(&config.source);
    let device = HeadlessDevice::with_max_texture_dimension(config.max_texture_dimension);
    let mut map = FrameLoop::new(&config, device, source)?;

    let animation = config.animation;
    let mut ticker = tokio::time::interval(Duration::from_millis(config.frame_interval_ms.max(1)));
    let mut last = None;
    for _ in 0..config.frames {
        ticker.tick().await;

        if !animation.is_idle() {
            map.pointer_down(scene::PRIMARY_BUTTON);
            map.pointer_move(animation.drag)?;
            map.pointer_up();
            if animation.wheel != 0.0 {
                map.wheel(animation.wheel)?;
            }
        }

        let report = map.run_frame().await?;
        if report.frame % 60 == 0 {
            info!(
                frame = report.frame,
                visible = report.visible,
                rendered = report.rendered,
                pending = report.pending,
                triangles = report.triangles,
                "rendering"
            );
        }
        last = Some(report);
    }

    let device = map.shutdown()?;
    let stats = device.stats();
    info!(
        frames = stats.frames_submitted,
        buffers_created = stats.buffers_created,
        buffers_destroyed = stats.buffers_destroyed,
        bytes_written = stats.bytes_written,
        last_frame = ?last,
        "viewer finished"
    );
    Ok(())
}
