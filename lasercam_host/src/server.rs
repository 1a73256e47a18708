//! Remote-control socket. Each client sends one command per line; the
//! bridge forwards it to the board and carries out whatever effect the board
//! hands back.

use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, TcpListener};

use anyhow::Context;
use lasercam_common::msg::{Reply, Request, MAX_COMMAND_LEN};
use log::{debug, error, info, warn};

use crate::effects::Effects;
use crate::xfer_protoc::{LinkError, Transport};

/// How a client session ended.
#[derive(Debug)]
pub enum Ended {
    /// The client hung up.
    Disconnected,
    /// The board stopped answering.
    LinkLost(LinkError),
}

pub struct Bridge<'a, T, E> {
    device: &'a mut T,
    effects: &'a mut E,
    stream_port: u16,
}

impl<'a, T: Transport, E: Effects> Bridge<'a, T, E> {
    pub fn new(device: &'a mut T, effects: &'a mut E, stream_port: u16) -> Self {
        Self {
            device,
            effects,
            stream_port,
        }
    }

    /// Run one client to completion. Commands are read from `reader` and
    /// answers go to `writer`. `host` is the address the client reached us
    /// on; stream URLs point there.
    ///
    /// A `Close` that goes unanswered is logged only. If the board is really
    /// gone, the next client's `Open` reports it.
    pub fn session<R: BufRead, W: Write>(
        &mut self,
        reader: &mut R,
        writer: &mut W,
        host: IpAddr,
    ) -> Ended {
        if let Err(e) = self.device.request(Request::Open) {
            return Ended::LinkLost(e);
        }

        let ended = self.run(reader, writer, host);

        self.effects.stop_stream();
        match self.device.request(Request::Close) {
            Ok(Reply::Fault) => warn!("board reported a fault while parking"),
            Ok(_) => {}
            Err(e) => warn!("close not delivered: {}", e),
        }
        ended
    }

    fn run<R: BufRead, W: Write>(&mut self, reader: &mut R, writer: &mut W, host: IpAddr) -> Ended {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => return Ended::Disconnected,
                Ok(_) => {}
                Err(e) => {
                    info!("client read failed: {}", e);
                    return Ended::Disconnected;
                }
            }
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            match self.command(text, writer, host) {
                Ok(true) => {}
                Ok(false) => return Ended::Disconnected,
                Err(e) => return Ended::LinkLost(e),
            }
        }
    }

    /// `Ok(false)` when the client can no longer be written to.
    fn command<C: Write>(
        &mut self,
        text: &str,
        client: &mut C,
        host: IpAddr,
    ) -> Result<bool, LinkError> {
        if text.len() > MAX_COMMAND_LEN || !text.is_ascii() {
            info!("unknown command {:?}", text);
            return Ok(true);
        }

        let reply = self.device.request(Request::Remote(text))?;
        debug!("{} -> {:?}", text, reply);

        let answer = match reply {
            Reply::Done => None,
            Reply::Ignored => {
                info!("unknown command {:?}", text);
                None
            }
            Reply::Fault => {
                error!("board could not carry out {}", text);
                None
            }
            Reply::CameraLed(on) => {
                info!("camera led {}", if on { "on" } else { "off" });
                None
            }
            Reply::Stream(true) => {
                if let Err(e) = self.effects.start_stream() {
                    error!("{:#}", e);
                }
                Some(stream_url(host, self.stream_port))
            }
            Reply::Stream(false) => {
                self.effects.stop_stream();
                Some(String::new())
            }
            Reply::Speak(n) => {
                if let Err(e) = self.effects.speak(n) {
                    warn!("{:#}", e);
                }
                None
            }
        };

        if let Some(answer) = answer {
            if let Err(e) = writeln!(client, "{}", answer).and_then(|_| client.flush()) {
                info!("client write failed: {}", e);
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn stream_url(host: IpAddr, port: u16) -> String {
    match host {
        IpAddr::V4(ip) => format!("http://{}:{}/", ip, port),
        IpAddr::V6(ip) => format!("http://[{}]:{}/", ip, port),
    }
}

/// Accept clients one at a time until the board link fails.
pub fn serve<T: Transport, E: Effects>(
    listener: TcpListener,
    device: &mut T,
    effects: &mut E,
    stream_port: u16,
) -> anyhow::Result<()> {
    info!("listening on {}", listener.local_addr()?);
    let mut bridge = Bridge::new(device, effects, stream_port);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        let peer = stream.peer_addr().context("client address")?;
        let host = stream.local_addr().context("local address")?.ip();
        info!("client {} connected", peer);

        let mut reader = BufReader::new(stream.try_clone().context("cloning client socket")?);
        let mut writer = stream;
        match bridge.session(&mut reader, &mut writer, host) {
            Ended::Disconnected => info!("client {} disconnected", peer),
            Ended::LinkLost(e) => {
                return Err(e).context("lost the board");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};
    use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, TcpStream};
    use std::thread;
    use std::time::Duration;

    use lasercam_common::session::{Effect, Outcome};
    use lasercam_common::Command;

    use super::*;
    use crate::effects::fake::RecordingEffects;

    /// Answers like the firmware would, without moving anything.
    #[derive(Default)]
    struct ScriptedBoard {
        seen: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl Transport for ScriptedBoard {
        fn request(&mut self, request: Request<'_>) -> Result<Reply, LinkError> {
            let text = match request {
                Request::Open => "<open>".to_string(),
                Request::Close => "<close>".to_string(),
                Request::Remote(text) => text.to_string(),
            };
            self.seen.push(text.clone());
            if self.fail_on == Some(text.as_str()) {
                return Err(LinkError::Nacked(3));
            }
            let outcome = match request {
                Request::Remote(text) => match Command::parse(text) {
                    Command::Unknown => Outcome::Ignored,
                    Command::Stream(on) => Outcome::Effect(Effect::Stream(on)),
                    Command::Speak(n) => Outcome::Effect(Effect::Speak(n)),
                    Command::CameraLed(on) => Outcome::Effect(Effect::CameraLed(on)),
                    _ => Outcome::Done,
                },
                _ => Outcome::Done,
            };
            Ok(outcome.into())
        }
    }

    /// Runs one session over scripted input and returns how it ended and
    /// what the client was sent.
    fn run_session(
        board: &mut ScriptedBoard,
        effects: &mut RecordingEffects,
        host: IpAddr,
        lines: &str,
    ) -> (Ended, String) {
        let mut input = Cursor::new(lines.as_bytes());
        let mut output = Vec::new();
        let ended = Bridge::new(board, effects, 8081).session(&mut input, &mut output, host);
        (ended, String::from_utf8_lossy(&output).into_owned())
    }

    const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

    #[test]
    fn session_is_bracketed_by_open_and_close() {
        let mut board = ScriptedBoard::default();
        let mut effects = RecordingEffects::default();

        let (ended, output) = run_session(&mut board, &mut effects, HOST, "LU\r\n\nZZ\nS2\n");

        assert!(matches!(ended, Ended::Disconnected));
        assert_eq!(board.seen, vec!["<open>", "LU", "ZZ", "S2", "<close>"]);
        assert_eq!(effects.spoken, vec![2]);
        assert_eq!(output, "");
    }

    #[test]
    fn stream_commands_answer_with_url_and_blank_line() {
        let mut board = ScriptedBoard::default();
        let mut effects = RecordingEffects::default();

        let (_, output) = run_session(&mut board, &mut effects, HOST, "CN\nCN\nCO\nCN\n");

        assert_eq!(
            output,
            "http://192.168.1.20:8081/\nhttp://192.168.1.20:8081/\n\nhttp://192.168.1.20:8081/\n"
        );
        assert_eq!(effects.stream_starts, 2);
        // disconnect stops a running stream
        assert!(!effects.streaming);
    }

    #[test]
    fn ipv6_stream_url_is_bracketed() {
        let mut board = ScriptedBoard::default();
        let mut effects = RecordingEffects::default();

        let (_, output) = run_session(
            &mut board,
            &mut effects,
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            "CN\n",
        );

        assert_eq!(output, "http://[::1]:8081/\n");
    }

    #[test]
    fn oversized_lines_never_reach_the_board() {
        let mut board = ScriptedBoard::default();
        let mut effects = RecordingEffects::default();
        let long = "X".repeat(MAX_COMMAND_LEN + 5);

        run_session(&mut board, &mut effects, HOST, &format!("{}\nLD\n", long));

        assert_eq!(board.seen, vec!["<open>", "LD", "<close>"]);
    }

    #[test]
    fn link_failure_ends_the_session() {
        let mut board = ScriptedBoard {
            fail_on: Some("LR"),
            ..Default::default()
        };
        let mut effects = RecordingEffects::default();

        let (ended, _) = run_session(&mut board, &mut effects, HOST, "LL\nLR\nLL\n");

        assert!(matches!(ended, Ended::LinkLost(LinkError::Nacked(3))));
        assert_eq!(board.seen, vec!["<open>", "LL", "LR", "<close>"]);
    }

    #[test]
    fn unanswered_close_after_hang_up_is_not_a_lost_link() {
        let mut board = ScriptedBoard {
            fail_on: Some("<close>"),
            ..Default::default()
        };
        let mut effects = RecordingEffects::default();

        let (ended, _) = run_session(&mut board, &mut effects, HOST, "LU\n");

        assert!(matches!(ended, Ended::Disconnected));
        assert_eq!(board.seen, vec!["<open>", "LU", "<close>"]);
    }

    #[test]
    fn serve_outlives_a_client_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let timeout = Some(Duration::from_secs(5));

            // first client sends one command and hangs up
            let mut first = TcpStream::connect(addr).unwrap();
            first.set_read_timeout(timeout).unwrap();
            first.write_all(b"LU\n").unwrap();
            first.shutdown(Shutdown::Write).unwrap();
            let mut rest = String::new();
            first.read_to_string(&mut rest).unwrap();
            assert_eq!(rest, "");

            // second client gets a stream url, then its next command loses
            // the board
            let second = TcpStream::connect(addr).unwrap();
            second.set_read_timeout(timeout).unwrap();
            let mut reader = BufReader::new(second.try_clone().unwrap());
            let mut writer = second;
            writer.write_all(b"CN\n").unwrap();
            let mut url = String::new();
            reader.read_line(&mut url).unwrap();
            writer.write_all(b"LR\n").unwrap();
            url
        });

        let mut board = ScriptedBoard {
            fail_on: Some("LR"),
            ..Default::default()
        };
        let mut effects = RecordingEffects::default();
        let served = serve(listener, &mut board, &mut effects, 8081);

        let url = client.join().unwrap();
        assert_eq!(url, "http://127.0.0.1:8081/\n");
        let err = served.unwrap_err();
        assert!(format!("{:#}", err).contains("lost the board"));
        assert_eq!(
            board.seen,
            vec!["<open>", "LU", "<close>", "<open>", "CN", "LR", "<close>"]
        );
    }
}
