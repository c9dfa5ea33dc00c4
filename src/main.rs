//! groovyclient - run commands through a local groovyserver
//!
//! Every argument is forwarded to the server untouched, so the client has no
//! options of its own. `--` and arguments that are not valid UTF-8 are passed
//! through as well.

use std::ffi::OsString;

use groovyclient::{client, common::logging};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logging::init_cli();

    let args: Vec<OsString> = std::env::args_os().skip(1).collect();

    let status = match client::run(args).await {
        Ok(status) => status,
        Err(e) => {
            if !e.is_interrupt() {
                eprintln!("groovyclient: {e}");
            }
            1
        }
    };

    std::process::exit(status);
}
