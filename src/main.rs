fn main() {
    if handle_cli_flags() {
        return;
    }

    if let Err(err) = fedi_tui::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("fedi-tui {}", fedi_tui::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "fedi-tui: follow hashtag timelines from the terminal.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n\nConfig: ~/.config/fedi-tui/config.yaml (FEDI_TUI_* overrides, FEDI_TUI_LOG filter)"
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}
