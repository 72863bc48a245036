use std::net::IpAddr;

use thiserror::Error;
use tracing::info;
use ureq::Error;

use crate::config::Auth;

/// The DynHost update endpoint.
pub const DYNHOST_SERVER: &str = "https://www.ovh.com/nic/update";

const USER_AGENT: &str = concat!("dynhostd ", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum UpdateError {
    #[error("authentication failed, verify the credentials")]
    BadAuth,

    #[error("got unexpected status code {0}")]
    UnexpectedStatus(u16),

    #[error("HTTP transport error: {0}")]
    Transport(Box<str>),
}

/// Anything that can push a hostname/address pair to the remote DNS record.
pub trait UpdateService {
    fn submit(&mut self, hostname: &str, ip: IpAddr, auth: &Auth) -> Result<(), UpdateError>;
}

/// Client for the DynHost flavour of the dyndns2 update protocol.
#[derive(Clone, Debug)]
pub struct DynHost {
    server: Box<str>,
}

impl DynHost {
    pub fn new(server: impl Into<Box<str>>) -> Self {
        Self {
            server: server.into(),
        }
    }
}

impl UpdateService for DynHost {
    fn submit(&mut self, hostname: &str, ip: IpAddr, auth: &Auth) -> Result<(), UpdateError> {
        let response = ureq::get(&self.server)
            .set("Authorization", &basic_auth(&auth.username, &auth.password))
            .set("User-Agent", USER_AGENT)
            .query("system", "dyndns")
            .query("hostname", hostname)
            .query("myip", &ip.to_string())
            .call();

        match response {
            Ok(response) => match response.status() {
                200 => {
                    info!("updated \"{hostname}\" with IP \"{ip}\"");
                    Ok(())
                }
                code => Err(UpdateError::UnexpectedStatus(code)),
            },

            Err(Error::Status(401, _)) => Err(UpdateError::BadAuth),
            Err(Error::Status(code, _)) => Err(UpdateError::UnexpectedStatus(code)),
            Err(Error::Transport(transport)) => {
                Err(UpdateError::Transport(transport.to_string().into()))
            }
        }
    }
}

fn basic_auth(username: &str, password: &str) -> String {
    let username_password = String::from(username) + ":" + password;
    let base64 = data_encoding::BASE64.encode(username_password.as_bytes());
    String::from("Basic ") + &base64
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{IpAddr, Ipv4Addr, TcpListener};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::{basic_auth, DynHost, UpdateError, UpdateService};
    use crate::config::Auth;

    fn auth() -> Auth {
        Auth {
            username: "nic-user".into(),
            password: "hunter2".into(),
        }
    }

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, 99))
    }

    /// Serves exactly one request with the given status line, handing the raw
    /// request head back through the channel.
    fn one_shot_server(status_line: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let mut request = Vec::new();
            let mut buf = [0_u8; 1024];
            loop {
                let read = stream.read(&mut buf).unwrap();
                request.extend_from_slice(&buf[..read]);
                if read == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(response.as_bytes()).unwrap();

            tx.send(String::from_utf8_lossy(&request).into_owned())
                .unwrap();
        });

        (format!("http://127.0.0.1:{port}/nic/update"), rx)
    }

    #[test]
    fn encodes_credentials_the_basic_way() {
        assert_eq!(basic_auth("user", "pass"), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn a_200_reports_success() {
        let (server, requests) = one_shot_server("200 OK");
        let mut service = DynHost::new(server);

        assert_eq!(service.submit("home.example.net", ip(), &auth()), Ok(()));

        let request = requests.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(request.starts_with("GET /nic/update?"));
        assert!(request.contains("system=dyndns"));
        assert!(request.contains("hostname=home.example.net"));
        assert!(request.contains("myip=203.0.113.99"));
        assert!(request.contains("Basic bmljLXVzZXI6aHVudGVyMg=="));
        assert!(request.contains("dynhostd"));
    }

    #[test]
    fn a_401_is_bad_auth() {
        let (server, _requests) = one_shot_server("401 Unauthorized");
        let mut service = DynHost::new(server);

        assert_eq!(
            service.submit("home.example.net", ip(), &auth()),
            Err(UpdateError::BadAuth)
        );
    }

    #[test]
    fn other_statuses_are_reported_verbatim() {
        let (server, _requests) = one_shot_server("503 Service Unavailable");
        let mut service = DynHost::new(server);

        assert_eq!(
            service.submit("home.example.net", ip(), &auth()),
            Err(UpdateError::UnexpectedStatus(503))
        );
    }

    #[test]
    fn an_unreachable_server_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut service = DynHost::new(format!("http://127.0.0.1:{port}/nic/update"));

        match service.submit("home.example.net", ip(), &auth()) {
            Err(UpdateError::Transport(_)) => (),
            other => panic!("expected a transport error, got {other:?}"),
        }
    }
}
