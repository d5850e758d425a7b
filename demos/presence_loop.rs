// A game-style tick loop driving the presence client
//
// Run with:
//   DISCORD_CLIENT_ID=YOUR_ID cargo run --example presence_loop -- --ticks 600
//
// Set RUST_LOG=debug to see the worker's connection handling.

use clap::Parser;
use presence_link::{
    ClientConfig, EndpointHint, EventHandler, PresenceBuilder, PresenceClient, ReadyInfo,
    RemoteError, Result, SubscriptionKind, User,
};
use std::thread;
use std::time::Duration;

/// Discord Rich Presence tick loop example
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Discord Application Client ID
    #[arg(short, long)]
    client_id: Option<String>,

    /// Endpoint to use: "auto" or 0-9
    #[arg(short, long, default_value = "auto")]
    endpoint: EndpointHint,

    /// Number of 100 ms ticks to run for
    #[arg(short, long, default_value_t = 300)]
    ticks: u32,

    /// Accept join requests instead of declining them
    #[arg(long)]
    accept_joins: bool,
}

struct Game {
    accept_joins: bool,
    join_requests: Vec<String>,
}

impl EventHandler for Game {
    fn on_ready(&mut self, info: &ReadyInfo) {
        let name = info.user.as_ref().map_or("unknown", |user| user.username.as_str());
        println!("Ready on discord-ipc-{} as {}", info.endpoint, name);
    }

    fn on_error(&mut self, error: &RemoteError) {
        eprintln!("Discord error {}: {}", error.code, error.message);
    }

    fn on_presence_update(&mut self, nonce: &str, _presence: Option<&serde_json::Value>) {
        println!("Presence accepted ({})", nonce);
    }

    fn on_subscribe(&mut self, kind: SubscriptionKind) {
        println!("Subscribed to {}", kind);
    }

    fn on_join(&mut self, secret: &str) {
        println!("Joining game with secret {}", secret);
    }

    fn on_spectate(&mut self, secret: &str) {
        println!("Spectating game with secret {}", secret);
    }

    fn on_join_request(&mut self, user: &User) {
        println!("{} wants to join", user.username);
        self.join_requests.push(user.id.clone());
    }

    fn on_disconnected(&mut self, code: Option<i64>, reason: &str) {
        println!("Disconnected ({:?}): {}", code, reason);
    }
}

fn main() -> Result {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let args = Args::parse();

    let client_id = args
        .client_id
        .or_else(|| std::env::var("DISCORD_CLIENT_ID").ok())
        .unwrap_or_else(|| {
            eprintln!("Error: DISCORD_CLIENT_ID is required!");
            eprintln!("Provide it via:");
            eprintln!("  - Command line: cargo run --example presence_loop -- --client-id YOUR_ID");
            eprintln!("  - Environment: DISCORD_CLIENT_ID=YOUR_ID cargo run --example presence_loop");
            std::process::exit(1);
        });

    let config = ClientConfig::new(client_id).with_endpoint(args.endpoint);
    let mut client = PresenceClient::new(config)?;

    for endpoint in client.discover_endpoints() {
        println!("Found {}", endpoint.path);
    }

    client.start()?;
    client.subscribe(SubscriptionKind::Join);
    client.subscribe(SubscriptionKind::JoinRequest);

    let mut game = Game {
        accept_joins: args.accept_joins,
        join_requests: Vec::new(),
    };
    let levels = ["Main Menu", "Forest", "Castle", "Victory"];

    for tick in 0..args.ticks {
        if tick % 100 == 0 {
            let level = levels[(tick / 100) as usize % levels.len()];
            client.set_presence(
                PresenceBuilder::new()
                    .state(level)
                    .details("Playing the demo")
                    .start_timestamp_now()
                    .large_image("logo")
                    .party("demo-party", 1, 4)
                    .join_secret("demo-join-secret")
                    .build(),
            )?;
        }

        client.pump(&mut game);
        for user_id in game.join_requests.drain(..) {
            client.respond(user_id, game.accept_joins);
        }

        thread::sleep(Duration::from_millis(100));
    }

    client.clear_presence();
    thread::sleep(Duration::from_millis(200));
    client.stop()?;
    println!("Stopped");
    Ok(())
}
