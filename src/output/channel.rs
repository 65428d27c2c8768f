use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{anyhow, Result};

use super::ImageSink;
use crate::pool::ImageBuffer;

/// Forwards frames over a std channel.
pub struct ChannelSink {
    tx: Sender<ImageBuffer>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<ImageBuffer>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl ImageSink for ChannelSink {
    fn deliver(&mut self, buffer: ImageBuffer) -> Result<()> {
        self.tx
            .send(buffer)
            .map_err(|_| anyhow!("image receiver has been dropped"))
    }
}
