//! cablemux command-line entry point.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result};
use cablemux::transport::memory::TransportCall;
use cablemux::{
    ChannelBinding, ChannelDescriptor, ChannelMap, Component, ComponentId, DebugLevel,
    MemoryTransport, Socket, SocketOptions,
};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI
#[derive(Parser)]
#[command(name = "cablemux")]
#[command(version = VERSION)]
#[command(about = "Channel subscription multiplexer over a shared pub/sub connection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective socket options (config file plus environment)
    Config,
    /// Walk a set of components through attach, mount and destroy on a loopback transport
    Demo {
        /// Channel every component subscribes to
        #[arg(long, default_value = "ChatChannel")]
        channel: String,
        /// Number of components sharing the channel
        #[arg(long, default_value_t = 2)]
        components: usize,
    },
}

/// Stand-in for a UI component in the demo.
struct DemoView {
    uid: ComponentId,
    label: String,
    inbox: RefCell<Vec<String>>,
}

impl Component for DemoView {
    fn uid(&self) -> ComponentId {
        self.uid
    }
}

fn demo_channels(channel: &str) -> ChannelMap<DemoView> {
    ChannelMap::new().channel(
        channel,
        ChannelDescriptor::new()
            .on_subscribed(|view: &DemoView| println!("  {} subscribed", view.label))
            .on_unsubscribed(|view: &DemoView| println!("  {} unsubscribed", view.label))
            .on_rejected(|view: &DemoView| println!("  {} rejected", view.label))
            .bind("new_message", |view: &DemoView, data| {
                println!("  {} received {}", view.label, data);
                view.inbox.borrow_mut().push(data.to_string());
            })
            .subscribe_on_mount(true),
    )
}

fn run_demo(channel: &str, count: usize) -> Result<()> {
    let mut options = SocketOptions::load()?;
    if options.credential.is_none() {
        options.credential = Some("demo-app-key".to_string());
    }
    options.debug = true;
    options.debug_level = DebugLevel::Info;

    let transport = MemoryTransport::new();
    let socket = Socket::new(Box::new(transport.clone()), options)?;
    let binding = ChannelBinding::new(socket);

    let views: Vec<Rc<DemoView>> = (0..count)
        .map(|i| {
            Rc::new(DemoView {
                uid: ComponentId::next(),
                label: format!("view-{}", i + 1),
                inbox: RefCell::new(Vec::new()),
            })
        })
        .collect();

    println!("Attaching and mounting {count} component(s) on '{channel}'");
    for view in &views {
        binding.on_attach(view, demo_channels(channel));
        binding.on_activate(view)?;
    }

    println!("Server confirms the subscription");
    transport.confirm(channel);

    println!("Server pushes 'new_message'");
    transport.emit(
        channel,
        "new_message",
        &serde_json::json!({ "content": "Hello from the server" }),
    );

    println!("Client performs 'send_message'");
    let accepted = binding
        .socket()
        .perform(channel, "send_message", &serde_json::json!({ "content": "Hi" }))?;
    println!("  accepted: {accepted}");

    println!("Destroying components");
    for view in &views {
        let lingering = binding
            .on_detach(view)
            .with_context(|| format!("Failed to detach {}", view.label))?;
        if !lingering.is_empty() {
            println!("  {} leaked: {}", view.label, lingering.join(", "));
        }
    }

    println!();
    println!("Transport calls:");
    for call in transport.calls() {
        println!("  {}", describe(&call));
    }
    Ok(())
}

fn describe(call: &TransportCall) -> String {
    match call {
        TransportCall::Connect { credential, options } => {
            format!("connect credential={credential} options={options}")
        }
        TransportCall::Subscribe(name) => format!("subscribe {name}"),
        TransportCall::Unsubscribe(name) => format!("unsubscribe {name}"),
        TransportCall::Bind { channel, event } => format!("bind {channel} {event}"),
        TransportCall::UnbindAll(name) => format!("unbind_all {name}"),
        TransportCall::Trigger {
            channel,
            event,
            data,
        } => format!("trigger {channel} {event} {data}"),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config => {
            let options = SocketOptions::load()?;
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
        Commands::Demo {
            channel,
            components,
        } => {
            run_demo(&channel, components)?;
        }
    }

    Ok(())
}
