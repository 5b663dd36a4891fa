//! Binary entrypoint for the Packdeck command-line tool.

use std::process;

#[tokio::main]
async fn main() {
    let exit_code = packdeck_app::run().await;
    if exit_code != 0 {
        process::exit(exit_code);
    }
}
