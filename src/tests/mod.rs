// Test modules for poly-llm crate
//
// Test organization follows the template pattern where each source file
// has a corresponding test file that focuses on business logic verification.

// Test helper utilities shared by the unit test modules
pub mod helpers;



// Composition and structured output
pub mod client;
