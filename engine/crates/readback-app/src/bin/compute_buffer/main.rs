use readback_app::app::ReadbackApp;
use readback_app::outer_app::compute_buffer_app::ComputeBufferApp;

fn main() {
    ReadbackApp::run(Box::new(ComputeBufferApp::new()));
}
