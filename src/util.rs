use pbr::ProgressBar;
use std::sync::mpsc::{channel, Sender};
use std::thread::{spawn, JoinHandle};

/// Draw a progress bar on stderr, advanced by counts sent from any thread.
///
/// The bar finishes once every sender is dropped; join the handle to wait for it.
pub fn draw_async_progress_bar(total: u64, message: &str) -> (Sender<u64>, JoinHandle<()>) {
    let (sender, receiver) = channel();
    let message = format!("{} ", message);
    (
        sender,
        spawn(move || {
            let mut pb = ProgressBar::on(::std::io::stderr(), total);
            pb.message(&message);
            for count in receiver {
                pb.add(count);
            }
            pb.finish();
        }),
    )
}
