// Interactive shell over a single ShoalKV store.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use multimap::{Options, Store};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (path, options) = parse_args()?;
    let store = Store::open(&path, options)
        .with_context(|| format!("opening store at {}", path))?;
    println!("shoal: store ready at {}", path);
    println!("Type 'help' for commands, 'quit' to exit");

    let mut input = String::new();
    loop {
        print!("shoal> ");
        io::stdout().flush()?;

        input.clear();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.trim().split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "help" | "h" | "?" => print_help(),

            "add" => {
                if parts.len() < 3 {
                    println!("Usage: add <key> <value>...");
                    continue;
                }
                match store.add(parts[1], &parts[2..]) {
                    Ok(()) => println!("ok"),
                    Err(e) => println!("error: {}", e),
                }
            }

            "get" => {
                if parts.len() != 2 {
                    println!("Usage: get <key>");
                    continue;
                }
                let values = store.get(parts[1]);
                println!("{} value(s)", values.len());
                for v in values {
                    println!("  {}", String::from_utf8_lossy(&v));
                }
            }

            "del" => {
                if parts.len() < 3 {
                    println!("Usage: del <key> <value>...");
                    continue;
                }
                store.del(parts[1], &parts[2..]);
                println!("ok");
            }

            "delprefix" => {
                if parts.len() < 3 {
                    println!("Usage: delprefix <key> <prefix>...");
                    continue;
                }
                store.del_by_prefix(parts[1], &parts[2..]);
                println!("ok");
            }

            "update" => {
                if parts.len() < 2 {
                    println!("Usage: update <key> [<value>...]");
                    continue;
                }
                match store.update(parts[1], &parts[2..]) {
                    Ok(()) => println!("ok"),
                    Err(e) => println!("error: {}", e),
                }
            }

            "exist" => {
                if parts.len() != 2 {
                    println!("Usage: exist <key>");
                    continue;
                }
                println!("{}", store.exist(parts[1]));
            }

            "quit" | "exit" | "q" => break,

            other => println!("unknown command '{}', try 'help'", other),
        }
    }

    Ok(())
}

fn parse_args() -> Result<(String, Options)> {
    let mut path = None;
    let mut options = Options::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--length" {
            let v = args.next().context("--length needs a byte count")?;
            options.length = v.parse().context("--length must be an integer")?;
        } else if arg == "--recover" {
            options.recover = true;
        } else if path.is_none() {
            path = Some(arg);
        } else {
            bail!("unexpected argument '{}'", arg);
        }
    }

    let Some(path) = path else {
        bail!("Usage: shoal <path> [--length <bytes>] [--recover]");
    };
    Ok((path, options))
}

fn print_help() {
    println!("Commands:");
    println!("  add <key> <value>...        append values to the key's chain");
    println!("  get <key>                   list the key's live values");
    println!("  del <key> <value>...        tombstone exact values");
    println!("  delprefix <key> <prefix>... tombstone values by byte prefix");
    println!("  update <key> [<value>...]   replace all values");
    println!("  exist <key>                 check for the key");
    println!("  quit                        exit");
}
