// Public quote intake
pub mod submission;

// Backoffice
pub mod export;
pub mod orders;
pub mod statistics;

// Email rendering and delivery
pub mod email;
