//! Captive configuration portal served while the device is in AP mode.
//!
//! One page: a form pre-filled with the current configuration, submitted as
//! JSON. The submission is queued for the runtime to pick up on its next
//! tick; the portal itself never touches NVS or restarts anything.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use esp_idf_svc::http::server::{Configuration, EspHttpServer};
use esp_idf_svc::io::{Read, Write};

use sense_core::ConfigPortal;

/// Keys shown but not editable.
const READ_ONLY: &[&str] = &["firmware_version", "hardware"];

pub struct HttpConfigPortal {
    server: Option<EspHttpServer<'static>>,
    submission: Arc<Mutex<Option<Vec<(String, String)>>>>,
}

impl HttpConfigPortal {
    pub fn new() -> Self {
        Self {
            server: None,
            submission: Arc::new(Mutex::new(None)),
        }
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_page(pairs: &[(String, String)]) -> String {
    let mut fields = String::new();
    for (key, value) in pairs {
        let readonly = if READ_ONLY.contains(&key.as_str()) {
            " readonly"
        } else {
            ""
        };
        fields.push_str(&format!(
            "<label>{k}</label><input name=\"{k}\" value=\"{v}\"{readonly}><br>\n",
            k = escape(key),
            v = escape(value),
        ));
    }
    format!(
        "<!DOCTYPE html><html><head><title>sense-node setup</title></head><body>\
         <h1>sense-node setup</h1>\
         <form id=\"cfg\">{fields}<button type=\"submit\">Save &amp; restart</button></form>\
         <script>\
         document.getElementById('cfg').addEventListener('submit',async e=>{{\
         e.preventDefault();\
         const data={{}};\
         for(const el of e.target.elements)if(el.name&&!el.readOnly)data[el.name]=el.value;\
         await fetch('/save',{{method:'POST',headers:{{'content-type':'application/json'}},\
         body:JSON.stringify(data)}});\
         document.body.innerHTML='<p>Saved. The device is restarting.</p>';\
         }});\
         </script></body></html>"
    )
}

impl ConfigPortal for HttpConfigPortal {
    fn start(&mut self, pairs: &[(String, String)]) -> Result<()> {
        let mut server = EspHttpServer::new(&Configuration::default())?;
        let page = render_page(pairs);

        server.fn_handler("/", esp_idf_svc::http::Method::Get, move |req| {
            let mut response = req.into_ok_response()?;
            response.write_all(page.as_bytes())?;
            Ok(()) as core::result::Result<(), Box<dyn std::error::Error>>
        })?;

        let submission = self.submission.clone();
        server.fn_handler("/save", esp_idf_svc::http::Method::Post, move |mut req| {
            let mut body = Vec::new();
            let mut chunk = [0u8; 512];
            loop {
                let read = req.read(&mut chunk)?;
                if read == 0 {
                    break;
                }
                body.extend_from_slice(&chunk[..read]);
                if body.len() > 4096 {
                    let mut response = req.into_status_response(413)?;
                    response.write_all(b"submission too large")?;
                    return Ok(());
                }
            }

            match serde_json::from_slice::<std::collections::BTreeMap<String, String>>(&body) {
                Ok(fields) => {
                    let pairs: Vec<(String, String)> = fields.into_iter().collect();
                    if let Ok(mut slot) = submission.lock() {
                        *slot = Some(pairs);
                    }
                    let mut response = req.into_ok_response()?;
                    response.write_all(b"ok")?;
                }
                Err(e) => {
                    log::warn!("rejecting malformed portal submission: {e}");
                    let mut response = req.into_status_response(400)?;
                    response.write_all(b"invalid submission")?;
                }
            }
            Ok(()) as core::result::Result<(), Box<dyn std::error::Error>>
        })?;

        self.server = Some(server);
        log::info!("config portal listening");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.server = None;
        Ok(())
    }

    fn poll(&mut self) -> Option<Vec<(String, String)>> {
        self.submission.lock().ok()?.take()
    }
}
