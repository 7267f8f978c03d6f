fn main() {
    if let Err(err) = grn_ledger::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
