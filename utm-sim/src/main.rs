//! utm-sim: synthetic drone flight feeding a utm server.
//!
//! Flies a circular loop around a center point and submits wire-format
//! telemetry over HTTP, printing any violations the server reports back.

use std::process::ExitCode;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use uuid::Uuid;

use utm_core::wire::{RawTelemetry, WireLocation};

#[derive(Parser)]
#[command(name = "utm-sim", version, about = "Drone telemetry simulator")]
struct Args {
    /// Drone id registered on the server
    #[arg(long)]
    drone_id: Uuid,

    /// Server base URL
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "UTM_SERVER")]
    server: String,

    /// API token of the drone's owner
    #[arg(long, env = "UTM_TOKEN")]
    token: String,

    /// Flight center latitude, degrees
    #[arg(long, default_value_t = 51.1694)]
    center_lat: f64,

    /// Flight center longitude, degrees
    #[arg(long, default_value_t = 71.4491)]
    center_lon: f64,

    /// Loop radius, degrees
    #[arg(long, default_value_t = 0.05)]
    radius: f64,

    /// Cruise altitude, meters
    #[arg(long, default_value_t = 100.0)]
    altitude: f64,

    /// Seconds between samples
    #[arg(long, default_value_t = 1.0)]
    interval: f64,

    /// Number of samples to send (0 = until interrupted)
    #[arg(long, default_value_t = 60)]
    count: u64,

    /// Samples per full loop
    #[arg(long, default_value_t = 120)]
    steps_per_loop: u64,
}

/// Position on the loop at a given step, as (longitude, latitude).
fn circle_position(
    center_lon: f64,
    center_lat: f64,
    radius: f64,
    step: u64,
    steps_per_loop: u64,
) -> (f64, f64) {
    let angle = (step % steps_per_loop) as f64 / steps_per_loop as f64 * std::f64::consts::TAU;
    (
        center_lon + radius * angle.sin(),
        center_lat + radius * angle.cos(),
    )
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/telemetry", args.server.trim_end_matches('/'));

    println!("Simulating drone {} against {}", args.drone_id, args.server);

    let mut battery = 100.0f64;
    let mut sent = 0u64;
    loop {
        if args.count > 0 && sent >= args.count {
            break;
        }

        let (lon, lat) = circle_position(
            args.center_lon,
            args.center_lat,
            args.radius,
            sent,
            args.steps_per_loop,
        );
        battery = (battery - 0.01).max(0.0);
        // Heading is tangent to the loop.
        let angle = (sent % args.steps_per_loop) as f64 / args.steps_per_loop as f64 * 360.0;
        let heading = (angle + 90.0) % 360.0;

        let sample = RawTelemetry {
            drone_id: Some(args.drone_id),
            timestamp: Some(Utc::now()),
            location: Some(WireLocation {
                coordinates: vec![lon, lat],
            }),
            altitude: Some(args.altitude),
            speed: Some(10.0),
            heading: Some(heading),
            battery_level: Some(battery),
            status: Some("flying".to_string()),
        };

        match client
            .post(&url)
            .bearer_auth(&args.token)
            .json(&sample)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                match body["violations"].as_array() {
                    Some(violations) if !violations.is_empty() => {
                        println!(
                            "({lon:.5}, {lat:.5}) -> {} violation(s): {}",
                            violations.len(),
                            body["violations"]
                        );
                    }
                    _ => println!("({lon:.5}, {lat:.5}) -> ok"),
                }
            }
            Ok(response) => eprintln!("server rejected sample: {}", response.status()),
            Err(e) => eprintln!("send failed: {e}"),
        }

        sent += 1;
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(args.interval)) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("Simulation interrupted");
                break;
            }
        }
    }

    println!("Sent {sent} samples");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_position_wraps() {
        let (lon0, lat0) = circle_position(71.0, 51.0, 0.05, 0, 120);
        let (lon_wrap, lat_wrap) = circle_position(71.0, 51.0, 0.05, 120, 120);
        assert_eq!((lon0, lat0), (lon_wrap, lat_wrap));
        // Step 0 sits due north of the center.
        assert_eq!(lon0, 71.0);
        assert!((lat0 - 51.05).abs() < 1e-12);
    }

    #[test]
    fn test_circle_position_stays_on_radius() {
        for step in 0..120 {
            let (lon, lat) = circle_position(71.0, 51.0, 0.05, step, 120);
            let r = ((lon - 71.0).powi(2) + (lat - 51.0).powi(2)).sqrt();
            assert!((r - 0.05).abs() < 1e-9);
        }
    }
}
