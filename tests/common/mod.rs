//! Shared helpers: tiny_http stub origins and in-memory PNG fixtures

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tiny_http::{Header, Response, Server};

pub enum Reply {
    Ok { content_type: &'static str, body: Vec<u8> },
    Status(u16),
    /// Sleep before answering 200 with an empty body
    Hang(Duration),
}

/// A stub HTTP origin that records every requested path (with query)
pub struct StubServer {
    pub base: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub fn start<F>(routes: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().expect("ip listener");
        let hits = Arc::new(Mutex::new(Vec::new()));
        let recorded = hits.clone();
        let routes = Arc::new(routes);

        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                let url = request.url().to_string();
                recorded.lock().unwrap().push(url.clone());
                let path = url.split('?').next().unwrap_or("").to_string();
                let routes = routes.clone();
                // one thread per request so a hanging route blocks nobody else
                std::thread::spawn(move || {
                    let _ = match routes(&path) {
                        Reply::Ok { content_type, body } => request.respond(
                            Response::from_data(body).with_header(
                                Header::from_bytes("Content-Type", content_type).unwrap(),
                            ),
                        ),
                        Reply::Status(code) => {
                            request.respond(Response::from_string("nope").with_status_code(code))
                        }
                        Reply::Hang(d) => {
                            std::thread::sleep(d);
                            request.respond(Response::empty(200))
                        }
                    };
                });
            }
        });

        StubServer {
            base: format!("http://{}", addr),
            hits,
        }
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

pub fn decode(png: &[u8]) -> image::RgbaImage {
    image::load_from_memory(png).unwrap().to_rgba8()
}

/// Whether any pixel is within 2 per channel of `rgba` (resampling noise)
pub fn has_pixel(img: &image::RgbaImage, rgba: [u8; 4]) -> bool {
    img.pixels()
        .any(|p| p.0.iter().zip(rgba).all(|(a, b)| a.abs_diff(b) <= 2))
}

/// Serve the real relay router on an ephemeral port; returns its base URL
#[cfg(feature = "relay")]
pub async fn start_relay(config: postmock::relay::RelayConfig) -> String {
    let app = postmock::relay::router(config).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}
