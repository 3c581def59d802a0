#[macro_export]
macro_rules! server_config {
    ($name:expr, $pretty_name:expr, $base_url:expr, $user_agent:expr) => {
        $crate::driver_config::ServerConfig {
            name: String::from($name),
            pretty_name: String::from($pretty_name),
            base_url: String::from($base_url),
            post_url: format!("{}/posts", $base_url),
            post_list_url: format!("{}/posts.json", $base_url),
            user_agent: String::from($user_agent),
            timeout_secs: 30,
            rate_limit: $crate::driver_config::RateLimitConfig::default(),
            retry: $crate::driver_config::RetryConfig::default(),
        }
    };
}
