fn main() -> std::process::ExitCode {
    comic_narrator_lib::run()
}
