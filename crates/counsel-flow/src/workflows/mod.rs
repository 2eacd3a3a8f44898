pub mod automation;
