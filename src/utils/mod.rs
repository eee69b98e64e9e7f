pub mod http;
pub mod logging;
pub mod retry;
pub mod timing;

#[cfg(test)]
pub mod test_support;
