//! Demo client exercising all four RouteGuide RPCs against a running server.

use clap::Parser;
use core::time::Duration;
use rand::Rng;
use routeguide_core::{
    geo,
    proto::{Point, Rectangle, RouteNote, route_guide_client::RouteGuideClient},
};
use tokio_stream::StreamExt;
use tonic::{Request, transport::Channel};

#[derive(Parser, Debug)]
#[command(name = "routeguide-client", version, about = "RouteGuide demo client")]
struct ClientArgs {
    /// Server URI.
    ///
    /// Environment variable: `ROUTE_GUIDE_ADDR`
    #[arg(long, env = "ROUTE_GUIDE_ADDR", default_value = "http://127.0.0.1:10000")]
    server_addr: String,

    /// Number of random points sent by `RecordRoute`.
    #[arg(long, default_value_t = 10)]
    route_points: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = ClientArgs::parse();
    let mut client = RouteGuideClient::connect(args.server_addr).await?;

    print_feature(&mut client).await?;
    print_features(&mut client).await?;
    run_record_route(&mut client, args.route_points).await?;
    run_route_chat(&mut client).await?;

    Ok(())
}

async fn print_feature(client: &mut RouteGuideClient<Channel>) -> anyhow::Result<()> {
    for point in [
        Point {
            latitude: 409_146_138,
            longitude: -746_188_906,
        },
        Point::default(),
    ] {
        let feature = client.get_feature(Request::new(point)).await?.into_inner();
        if feature.name.is_empty() {
            println!("No feature at {point:?}");
        } else {
            println!("FEATURE = {feature:?}");
        }
    }
    Ok(())
}

async fn print_features(client: &mut RouteGuideClient<Channel>) -> anyhow::Result<()> {
    let rect = Rectangle {
        lo: Some(Point {
            latitude: 400_000_000,
            longitude: -750_000_000,
        }),
        hi: Some(Point {
            latitude: 420_000_000,
            longitude: -730_000_000,
        }),
    };

    let mut stream = client
        .list_features(Request::new(rect))
        .await?
        .into_inner();

    while let Some(feature) = stream.message().await? {
        println!("FEATURE = {feature:?}");
    }
    Ok(())
}

async fn run_record_route(
    client: &mut RouteGuideClient<Channel>,
    count: usize,
) -> anyhow::Result<()> {
    let mut rng = rand::rng();
    let points: Vec<Point> = (0..count).map(|_| random_point(&mut rng)).collect();
    println!("Traversing {} points", points.len());

    let summary = client
        .record_route(Request::new(tokio_stream::iter(points)))
        .await?
        .into_inner();
    println!("SUMMARY = {summary:?}");
    Ok(())
}

async fn run_route_chat(client: &mut RouteGuideClient<Channel>) -> anyhow::Result<()> {
    let notes = [
        ("First message", 0, 1),
        ("Second message", 0, 2),
        ("Third message", 0, 3),
        ("Fourth message", 0, 1),
    ]
    .map(|(message, latitude, longitude)| RouteNote {
        location: Some(Point {
            latitude,
            longitude,
        }),
        message: message.to_string(),
    });

    let outbound = tokio_stream::iter(notes).throttle(Duration::from_millis(100));
    let mut inbound = client
        .route_chat(Request::new(outbound))
        .await?
        .into_inner();

    while let Some(note) = inbound.message().await? {
        println!("NOTE = {note:?}");
    }
    Ok(())
}

fn random_point(rng: &mut impl Rng) -> Point {
    let point = Point {
        latitude: rng.random_range(400_000_000..420_000_000),
        longitude: rng.random_range(-750_000_000..-730_000_000),
    };
    debug_assert!(geo::is_valid(&point));
    point
}
