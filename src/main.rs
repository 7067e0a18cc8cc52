use std::env;
use std::io;
use std::process;
use std::time::Instant;

use dnswalk::resolver::{Resolver, ResolverConfig};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let (mode, domain) = match args.as_slice() {
        [_, mode, domain] if matches!(mode.as_str(), "iterative" | "recursive") => {
            (mode.as_str(), domain.as_str())
        }
        _ => {
            println!("Usage: dnswalk <iterative|recursive> <domain>");
            process::exit(1);
        }
    };

    let resolver = Resolver::new(ResolverConfig::default());
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let started = Instant::now();

    let outcome = match mode {
        "iterative" => resolver.iterative_lookup(domain, &mut out),
        _ => resolver.recursive_lookup(domain, &mut out),
    };
    if let Err(err) = outcome {
        eprintln!("output error: {err}");
    }

    println!("Time taken: {:.3} seconds", started.elapsed().as_secs_f64());
}
