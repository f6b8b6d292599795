pub mod twitter_search;
