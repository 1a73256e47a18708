use std::net::TcpListener;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lasercam_common::msg::{Reply, Request};
use log::{info, warn};

mod config;
mod effects;
mod server;
mod usb;
mod xfer_protoc;

use config::HostConfig;
use effects::ProcessEffects;
use xfer_protoc::Transport;

/// Bridge between remote-control clients and the lasercam servo board
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file; built-in defaults otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port of the board, overrides the config file
    #[arg(short, long, global = true)]
    port: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Accept remote-control clients on a TCP socket
    Serve {
        /// Listen address, e.g. 0.0.0.0:8080
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Open a session, send commands, print each reply
    Send {
        /// Commands such as LU, C!, CM:4.5:-2
        #[arg(required = true)]
        commands: Vec<String>,

        /// Print replies as JSON
        #[arg(long)]
        json: bool,
    },
    /// List serial ports and mark the board
    Ports,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = HostConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        cfg.port = Some(port);
    }

    match args.command {
        Cmd::Serve { listen } => {
            if let Some(listen) = listen {
                cfg.listen = listen;
            }
            let mut device = usb::open(&cfg)?;
            let mut effects = ProcessEffects::new(&cfg);
            let listener = TcpListener::bind(&cfg.listen)
                .with_context(|| format!("binding {}", cfg.listen))?;
            server::serve(listener, &mut device, &mut effects, cfg.stream_port)
        }
        Cmd::Send { commands, json } => {
            let mut device = usb::open(&cfg)?;
            send(&mut device, &commands, json)
        }
        Cmd::Ports => {
            for p in usb::list_ports()? {
                let id = p
                    .usb_id
                    .map(|(vid, pid)| format!("{:04x}:{:04x}", vid, pid))
                    .unwrap_or_else(|| "-".to_string());
                let mark = if p.is_lasercam { "  <- lasercam" } else { "" };
                println!("{:<24} {}{}", p.name, id, mark);
            }
            Ok(())
        }
    }
}

fn send<T: Transport>(device: &mut T, commands: &[String], json: bool) -> anyhow::Result<()> {
    device.request(Request::Open).context("opening session")?;
    let mut result = Ok(());
    for command in commands {
        let reply = match device.request(Request::Remote(command)) {
            Ok(reply) => reply,
            Err(e) => {
                result = Err(e).with_context(|| format!("sending {}", command));
                break;
            }
        };
        if json {
            println!("{}", serde_json::to_string(&reply)?);
        } else {
            println!("{} {}", command, describe(reply));
        }
    }
    info!("closing session");
    if let Err(e) = device.request(Request::Close) {
        warn!("close not delivered: {}", e);
    }
    result
}

fn describe(reply: Reply) -> String {
    match reply {
        Reply::Done => "ok".to_string(),
        Reply::Ignored => "unknown command".to_string(),
        Reply::Fault => "fault".to_string(),
        Reply::Stream(on) => format!("stream {}", if on { "start" } else { "stop" }),
        Reply::Speak(n) => format!("speak {}", n),
        Reply::CameraLed(on) => format!("camera led {}", if on { "on" } else { "off" }),
    }
}
