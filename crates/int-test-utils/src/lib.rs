//! Test helpers shared by the deployer integration tests.

mod mock_node;

pub use mock_node::MockNode;
