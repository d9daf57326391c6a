fn main() {
    if let Err(error) = searchything_core::runtime::run() {
        tracing::error!(%error, "runtime failed");
        eprintln!("[searchything] runtime failed: {error}");
        std::process::exit(1);
    }
}
