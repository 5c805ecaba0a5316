mod overlay_test;
mod service_test;
