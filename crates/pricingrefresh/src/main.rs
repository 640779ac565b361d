use accelbench_db::repositories::InstanceTypeRepo;
use accelbench_pricingrefresh::refresh_region;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accelbench_pricingrefresh=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let regions: Vec<String> = std::env::var("PRICING_REGIONS")
        .unwrap_or_else(|_| "us-east-2".into())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let pool = accelbench_db::create_pool(&database_url).await?;
    accelbench_db::health_check(&pool).await?;

    // The AWS Pricing API is only served out of us-east-1.
    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new("us-east-1"))
        .load()
        .await;
    let client = aws_sdk_pricing::Client::new(&aws_config);

    let instance_types = InstanceTypeRepo::list(&pool).await?;
    tracing::info!(count = instance_types.len(), "Loaded instance types");

    let today = chrono::Utc::now().date_naive();

    for region in &regions {
        let summary = refresh_region(&pool, &client, &instance_types, region, today).await;
        tracing::info!(
            region,
            updated = summary.updated,
            total = summary.total,
            "Pricing refresh finished for region",
        );
    }

    tracing::info!(regions = %regions.join(", "), "Pricing refresh complete");
    Ok(())
}
