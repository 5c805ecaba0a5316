mod config_test;
mod properties_test;
mod version_test;
