//! Send one request to a FastCGI responder and print what it returns.
//!
//!     cargo run --example request -- 127.0.0.1:9000 /var/www/html/index.php [body]

extern crate env_logger;
extern crate fcgi_client;

use fcgi_client::{Config, Error, RequestState, Session};

use std::env;
use std::process;

fn usage() -> ! {
    eprintln!("usage: request <host:port> <script path> [body]");
    process::exit(2);
}

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| usage());
    let script = args.next().unwrap_or_else(|| usage());
    let body = args.next().unwrap_or_default();

    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host.to_owned(), port),
            Err(_) => usage(),
        },
        None => (addr.clone(), 9000),
    };

    let method = if body.is_empty() { "GET" } else { "POST" };
    let content_length = body.len().to_string();
    let params = vec![
        ("GATEWAY_INTERFACE", "FastCGI/1.0"),
        ("REQUEST_METHOD", method),
        ("SCRIPT_FILENAME", script.as_str()),
        ("SCRIPT_NAME", script.as_str()),
        ("REQUEST_URI", script.as_str()),
        ("QUERY_STRING", ""),
        ("SERVER_PROTOCOL", "HTTP/1.1"),
        ("CONTENT_TYPE", "application/x-www-form-urlencoded"),
        ("CONTENT_LENGTH", content_length.as_str()),
    ];

    let mut session = Session::new(Config::new(host, port));
    match session.request(params, body.as_bytes()) {
        Ok(response) => {
            print!("{}", response.body_text());
            if response.state == RequestState::Error {
                eprintln!("responder reported an error (app status {:?})", response.app_status);
                process::exit(1);
            }
        }
        Err(Error::Incomplete { partial, source }) => {
            print!("{}", partial.body_text());
            eprintln!("response cut short: {}", source);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
