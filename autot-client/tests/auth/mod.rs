mod login_tests;
mod token_persistence_tests;
