//! Connects to a soundbar and prints every state change.
//!
//! ```text
//! cargo run --example monitor -- 192.168.1.40 [port]
//! ```

use lgsoundbar::{DeviceConfig, DeviceEvent, Soundbar, DEFAULT_PORT};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let Some(address) = args.next() else {
        eprintln!("usage: monitor <address> [port]");
        std::process::exit(2);
    };
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };

    let soundbar = Soundbar::new(DeviceConfig::new("monitor", "Monitor", address).with_port(port))?;
    let mut events = soundbar.subscribe();
    soundbar.connect().await?;

    println!(
        "{} ({}) is {:?}, source {:?}, sound mode {:?}, volume {:.0}%",
        soundbar.device_name(),
        soundbar.serial_number().unwrap_or_default(),
        soundbar.state(),
        soundbar.source(),
        soundbar.sound_mode(),
        soundbar.volume(),
    );

    loop {
        tokio::select! {
            event = events.recv() => match event? {
                DeviceEvent::Update { changes, .. } => {
                    for (attribute, value) in changes {
                        println!("{:?}: {}", attribute, serde_json::to_string(&value)?);
                    }
                }
                other => println!("{:?}", other),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    soundbar.disconnect().await;
    Ok(())
}
