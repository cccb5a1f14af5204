fn main() {
    degenerate_meme_lib::run()
}
