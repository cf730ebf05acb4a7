//! Turning failed jobs into something a user can read

use ereader_device::{DeviceError, FeedbackLevel, Job, StorageArea};

/// Marker some USB stacks put in the failure text of a flaky transfer
pub const TRANSIENT_BUS_ERROR: &str = "Could not read 32 bytes on the control bus.";

/// What to show for a failed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    /// The driver supplied the message itself
    Dialog {
        level: FeedbackLevel,
        message: String,
        details: Option<String>,
    },
    /// An upload ran out of space
    NoSpace { area: StorageArea, titles: Vec<String> },
    /// Temporary bus error; replugging usually fixes it
    TransientBus,
    /// Anything else, shown with the full failure details
    Generic { details: String },
}

impl Feedback {
    /// Classify a finished job, `None` when it did not fail
    ///
    /// `titles` name the books involved and are only used for
    /// out-of-space uploads.
    pub fn classify(job: &Job, titles: &[String]) -> Option<Feedback> {
        if !job.is_failed() {
            return None;
        }

        let details = job.details().unwrap_or_default();
        let feedback = match job.error().as_deref() {
            Some(DeviceError::UserFeedback {
                level,
                message,
                details,
            }) => Feedback::Dialog {
                level: *level,
                message: message.clone(),
                details: details.clone(),
            },
            Some(DeviceError::FreeSpace { area }) => Feedback::NoSpace {
                area: *area,
                titles: titles.to_vec(),
            },
            _ if details.contains(TRANSIENT_BUS_ERROR) => Feedback::TransientBus,
            _ => Feedback::Generic { details },
        };
        Some(feedback)
    }

    pub fn level(&self) -> FeedbackLevel {
        match self {
            Feedback::Dialog { level, .. } => *level,
            _ => FeedbackLevel::Error,
        }
    }

    /// Short dialog title
    pub fn title(&self) -> &'static str {
        match self {
            Feedback::Dialog { .. } => "Failed",
            Feedback::NoSpace { .. } => "No space on device",
            Feedback::TransientBus => "Error talking to device",
            Feedback::Generic { .. } => "Error communicating with device",
        }
    }

    /// Main message text
    pub fn message(&self) -> String {
        match self {
            Feedback::Dialog { message, .. } => message.clone(),
            Feedback::NoSpace { area, titles } => {
                let mut message = format!("Cannot upload books to device, there is no more free space available {area}.");
                for title in titles {
                    message.push_str("\n  ");
                    message.push_str(title);
                }
                message
            }
            Feedback::TransientBus => {
                "There was a temporary error talking to the device. Please unplug and reconnect the device and or reboot."
                    .to_string()
            }
            Feedback::Generic { .. } => "Error communicating with device".to_string(),
        }
    }

    /// Extra text for an expandable details section
    pub fn details(&self) -> Option<&str> {
        match self {
            Feedback::Dialog { details, .. } => details.as_deref(),
            Feedback::Generic { details } => Some(details),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ereader_device::{Job, JobOutput};
    use proptest::prelude::*;
    use rstest::rstest;
    use std::sync::Arc;

    fn failed_job(error: DeviceError) -> Arc<Job> {
        let job = Job::new(Box::new(|_| Ok(JobOutput::Deleted(Vec::new()))), "test");
        job.abort(error);
        job
    }

    #[test]
    fn test_succeeded_job_has_no_feedback() {
        let job = Job::new(Box::new(|_| Ok(JobOutput::Deleted(Vec::new()))), "test");
        assert_eq!(Feedback::classify(&job, &[]), None);
    }

    #[test]
    fn test_user_feedback_keeps_level_and_details() {
        let job = failed_job(DeviceError::user_feedback(
            FeedbackLevel::Warning,
            "Reader is locked",
            Some("unlock it".into()),
        ));

        let feedback = Feedback::classify(&job, &[]).unwrap();
        assert_eq!(feedback.level(), FeedbackLevel::Warning);
        assert_eq!(feedback.message(), "Reader is locked");
        assert_eq!(feedback.details(), Some("unlock it"));
    }

    #[rstest]
    #[case(StorageArea::MainMemory, "in main memory")]
    #[case(StorageArea::Card, "on the storage card")]
    fn test_free_space_lists_titles(#[case] area: StorageArea, #[case] where_: &str) {
        let job = failed_job(DeviceError::FreeSpace { area });
        let titles = vec!["Dune".to_string(), "Emma".to_string()];

        let feedback = Feedback::classify(&job, &titles).unwrap();
        assert_eq!(feedback, Feedback::NoSpace { area, titles });
        let message = feedback.message();
        assert!(message.contains(where_));
        assert!(message.contains("Dune") && message.contains("Emma"));
    }

    #[test]
    fn test_transient_bus_error() {
        let job = failed_job(DeviceError::protocol(format!("usb: {TRANSIENT_BUS_ERROR}")));
        assert_eq!(Feedback::classify(&job, &[]), Some(Feedback::TransientBus));
    }

    #[test]
    fn test_generic_failure_carries_details() {
        let job = failed_job(DeviceError::NotConnected);
        let feedback = Feedback::classify(&job, &[]).unwrap();
        assert_eq!(
            feedback,
            Feedback::Generic {
                details: "Device no longer connected.".to_string()
            }
        );
        assert_eq!(feedback.title(), "Error communicating with device");
    }

    proptest! {
        #[test]
        fn prop_protocol_failures_are_generic(message in "[a-zA-Z0-9 .:]{0,60}") {
            let job = failed_job(DeviceError::protocol(message.clone()));
            prop_assert_eq!(Feedback::classify(&job, &[]), Some(Feedback::Generic { details: message }));
        }
    }
}
