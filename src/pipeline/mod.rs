pub mod checkin; // Group check-in and room assignment
pub mod extraction; // Capture → documents, provider selection, fallback
pub mod intake; // Review session, duplicates, commit, bulk queue
pub mod normalize; // Name/id/date normalization shared with storage
