//! mousehub host binary.
//!
//! Binds one USB mouse to a port, logs every state change, and prints
//! diagnostic reports on request:
//!
//! ```text
//! mousehub <port> <vendor-id> <product-id> [interface] [poll-ms]
//! ```
//!
//! Vendor and product ids are hexadecimal (`046D`, `0x046D`). A poll
//! interval of 0 or omitted selects the device-derived interval. While
//! running, enter a detail level 0-4 to print a report, or `q` to quit.

use std::env;
use std::io;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use mousehub::{MousePort, PortConfig, ADDRESS_WHEEL, ADDRESS_X, ADDRESS_Y};

fn parse_hex_id(arg: &str, what: &str) -> Result<u16> {
    let digits = arg.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).with_context(|| format!("invalid {what} {arg:?}"))
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 3 || args.len() > 5 {
        bail!("usage: mousehub <port> <vendor-id> <product-id> [interface] [poll-ms]");
    }
    let vendor_id = parse_hex_id(&args[1], "vendor id")?;
    let product_id = parse_hex_id(&args[2], "product id")?;
    let interface = match args.get(3) {
        Some(arg) => arg.parse().with_context(|| format!("invalid interface {arg:?}"))?,
        None => 0,
    };
    let poll_interval = match args.get(4) {
        Some(arg) => {
            let ms: i64 = arg.parse().with_context(|| format!("invalid poll-ms {arg:?}"))?;
            (ms > 0).then(|| Duration::from_millis(ms as u64))
        }
        None => None,
    };

    let port = MousePort::configure(PortConfig {
        port_name: args[0].clone(),
        vendor_id,
        product_id,
        interface,
        poll_interval,
        priority: None,
    })?;

    for bit in 0..=7 {
        port.register(bit, move |value| println!("button {bit}: {value}"));
    }
    port.register(ADDRESS_X, |value| println!("x: {value}"));
    port.register(ADDRESS_Y, |value| println!("y: {value}"));
    port.register(ADDRESS_WHEEL, |value| println!("wheel: {value}"));

    println!("Polling {}. Enter a detail level 0-4 for a report, or q to quit.", port.identity());
    for line in io::stdin().lines() {
        let line = line?;
        match line.trim() {
            "" => {}
            "q" | "quit" => break,
            input => match input.parse::<u8>() {
                Ok(level) if level <= 4 => print!("{}", port.report(level)),
                _ => eprintln!("unrecognized input: {input}"),
            },
        }
    }

    port.shutdown();
    Ok(())
}
