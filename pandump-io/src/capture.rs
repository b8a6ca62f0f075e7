use crate::clock::Clock;
use crate::link::DeviceLink;
use crate::transport::Connector;
use log::{error, info};
use pandump::Frame;
use pandump::dump::{DumpError, DumpWriter};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub batches: u64,
    pub frames: u64,
    pub write_errors: u64,
}

/// Single-threaded capture loop feeding every writer from one link
pub struct Capture<C: Connector, K: Clock> {
    link: DeviceLink<C, K>,
    writers: Vec<DumpWriter>,
    summary: CaptureSummary,
}

impl<C: Connector, K: Clock> Capture<C, K> {
    pub fn new(link: DeviceLink<C, K>, writers: Vec<DumpWriter>) -> Self {
        Self {
            link,
            writers,
            summary: CaptureSummary::default(),
        }
    }

    pub fn link(&self) -> &DeviceLink<C, K> {
        &self.link
    }

    pub fn writers(&self) -> &[DumpWriter] {
        &self.writers
    }

    pub fn summary(&self) -> &CaptureSummary {
        &self.summary
    }

    /// Forward batches until the link reports shutdown, then close the
    /// socket and every writer
    pub fn run(&mut self) -> Result<CaptureSummary, DumpError> {
        while let Some(frames) = self.link.wait_for_message() {
            self.dispatch(&frames);
        }
        info!("Stopping capture");
        self.shutdown()?;
        Ok(self.summary.clone())
    }

    /// Hand each frame to every writer in order. A failing writer does not
    /// keep the frame from the others.
    pub fn dispatch(&mut self, frames: &[Frame]) {
        self.summary.batches += 1;
        for frame in frames {
            self.summary.frames += 1;
            for writer in self.writers.iter_mut() {
                if let Err(e) = writer.write_frame(frame) {
                    error!("{} writer: {e}", writer.format());
                    self.summary.write_errors += 1;
                }
            }
        }
        for writer in self.writers.iter_mut() {
            if let Err(e) = writer.flush() {
                error!("{} writer: {e}", writer.format());
                self.summary.write_errors += 1;
            }
        }
    }

    /// Close the link and all writers. Every writer gets closed; the first
    /// error is returned.
    pub fn shutdown(&mut self) -> Result<(), DumpError> {
        self.link.close();
        let mut result = Ok(());
        for writer in self.writers.iter_mut() {
            if let Err(e) = writer.close() {
                error!("{} writer: {e}", writer.format());
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}
