#![forbid(unsafe_code)]

use std::process;

fn main() {
    let result = spind::daemon_main();
    if let Err(e) = &result {
        eprintln!("spind: {e}");
    }
    process::exit(if result.is_ok() { 0 } else { 1 });
}
