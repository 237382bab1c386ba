//! shardkv CLI Client
//!
//! Command-line interface for talking to any shardkv node. The node routes
//! the request to the key's owner.

use bytes::Bytes;
use clap::{Parser, Subcommand};
use shardkv::network::{HttpTransport, Transport};
use shardkv::protocol::{percent_encode, Method, Request, ENTITY_PATH, ID_PARAM};

/// shardkv CLI
#[derive(Parser, Debug)]
#[command(name = "shardkv-cli")]
#[command(about = "CLI for the shardkv key-value store")]
struct Args {
    /// Node URL
    #[arg(short, long, default_value = "http://127.0.0.1:19234")]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },
}

fn main() {
    let args = Args::parse();

    let (method, key, body) = match args.command {
        Commands::Get { key } => (Method::Get, key, Bytes::new()),
        Commands::Put { key, value } => (Method::Put, key, Bytes::from(value)),
        Commands::Del { key } => (Method::Delete, key, Bytes::new()),
    };

    let target = format!("{}?{}={}", ENTITY_PATH, ID_PARAM, percent_encode(&key));
    let request = Request::new(method, &target, body);

    match HttpTransport::default().forward(&args.node, &request) {
        Ok(response) if response.status.is_success() => {
            if response.body.is_empty() {
                println!("{}", response.status);
            } else {
                println!("{}", String::from_utf8_lossy(&response.body));
            }
        }
        Ok(response) => {
            eprintln!("{}", response.status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    }
}
