mod blacklist_test;
mod repository_test;
mod resolver_test;
