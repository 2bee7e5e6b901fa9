mod app;

use crate::app::App;
use anyhow::Context;
use fallscape_runtime::{Config, Graphics};
use winit::event_loop::{DeviceEvents, EventLoop};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = Config::load_or_default();

    let event_loop = EventLoop::<Graphics>::with_user_event()
        .build()
        .context("failed to create event loop")?;
    event_loop.listen_device_events(if config.controls.enabled {
        DeviceEvents::WhenFocused
    } else {
        DeviceEvents::Never
    });

    let mut app = App::new(&event_loop, config);
    event_loop.run_app(&mut app).context("event loop terminated")
}
