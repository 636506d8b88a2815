mod persistence_tests;
mod state_tests;
