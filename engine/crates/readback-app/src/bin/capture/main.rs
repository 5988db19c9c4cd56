use readback_app::app::ReadbackApp;
use readback_app::outer_app::capture_app::CaptureApp;

fn main() {
    ReadbackApp::run(Box::new(CaptureApp::new(60)));
}
