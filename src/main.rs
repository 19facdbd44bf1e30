fn main() {
    std::process::exit(mobiclaw_lib::run());
}
