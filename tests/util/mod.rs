#![allow(dead_code)]

pub mod scripted;

use aws_sdk_dynamodb::{
    config::{BehaviorVersion, Credentials, Region},
    operation::create_table::builders::CreateTableFluentBuilder,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
};
use dynamodb_reconcile::PollInterval;
use std::time::Duration;
use uuid::Uuid;

/// Test wait timeout, generally long enough that something has probably gone wrong.
pub const TEST_WAIT: Duration = Duration::from_secs(4);

/// Config for localhost dynamodb.
pub async fn localhost_dynamodb() -> aws_sdk_dynamodb::Client {
    let conf = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new("eu-west-1"))
        .credentials_provider(Credentials::new("local", "local", None, None, "test"))
        .endpoint_url("http://localhost:8000")
        .load()
        .await;
    aws_sdk_dynamodb::Client::new(&conf)
}

/// Client polling quickly with short deadlines, dynamodb local settles almost
/// immediately.
pub fn test_client(dynamodb: aws_sdk_dynamodb::Client) -> dynamodb_reconcile::Client {
    dynamodb_reconcile::Client::builder()
        .create_timeout(TEST_WAIT)
        .update_timeout(TEST_WAIT)
        .delete_timeout(TEST_WAIT)
        .replica_delay(Duration::ZERO)
        .poll_interval(PollInterval::Fixed(Duration::from_millis(100)))
        .build(dynamodb)
}

/// Unique table name so concurrent test runs don't collide.
pub fn unique_table(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

/// Create table request with "key" as a string hash key.
pub fn create_table_request(
    dynamodb: &aws_sdk_dynamodb::Client,
    table_name: &str,
) -> CreateTableFluentBuilder {
    dynamodb
        .create_table()
        .table_name(table_name)
        .billing_mode(BillingMode::PayPerRequest)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("key")
                .attribute_type(ScalarAttributeType::S)
                .build()
                .unwrap(),
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("key")
                .key_type(KeyType::Hash)
                .build()
                .unwrap(),
        )
}
