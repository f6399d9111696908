use mpp_core::{FeedbackSink, QaFeedback};

/// Owns the executor's QA-feedback slot for one execution loop.
///
/// `publish` hands the current feedback to the sink at the start of an
/// iteration; dropping the scope clears the slot, whichever way the loop
/// exits.
pub struct FeedbackScope<'a> {
    sink: Option<&'a dyn FeedbackSink>,
}

impl<'a> FeedbackScope<'a> {
    pub fn new(sink: Option<&'a dyn FeedbackSink>) -> Self {
        Self { sink }
    }

    pub fn publish(&self, feedback: Option<&QaFeedback>) {
        if let Some(sink) = self.sink {
            sink.set_feedback(feedback.cloned());
        }
    }
}

impl Drop for FeedbackScope<'_> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink {
            sink.set_feedback(None);
        }
    }
}
