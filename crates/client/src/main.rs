fn main() -> anyhow::Result<()> {
    poseview_client::run()
}
