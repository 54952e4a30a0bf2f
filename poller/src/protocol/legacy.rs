//! Line-oriented text status protocols.
//!
//! Both the `status` and `getstatus` families reply with a single datagram:
//! the `FF FF FF FF` header, a server-info line, then one line per player
//! carrying a double-quoted name. The `status` variants put a fixed count of
//! numeric fields (frags, ping, ...) before the name; `getstatus` replies are
//! read by taking every quoted token.

use super::QueryError;
use once_cell::sync::Lazy;
use regex::Regex;
use shared::{connectionless_packet, MAX_DATAGRAM_SIZE, QUERY_PREFIX};
use tokio::net::UdpSocket;

fn status_line_pattern(numeric_fields: usize) -> Regex {
    let pattern = format!(r#"(?:-?\d+\s+){{{}}}"([^"\r\n]+)""#, numeric_fields);
    Regex::new(&pattern).expect("valid regex")
}

static STATUS_FOUR_FIELDS: Lazy<Regex> = Lazy::new(|| status_line_pattern(4));
static STATUS_TWO_FIELDS: Lazy<Regex> = Lazy::new(|| status_line_pattern(2));
static QUOTED_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"\r\n]+)""#).expect("valid regex"));

/// Sends a connectionless command and returns the single reply datagram.
pub(crate) async fn exchange(socket: &UdpSocket, command: &[u8]) -> Result<Vec<u8>, QueryError> {
    socket.send(&connectionless_packet(command)).await?;

    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
    let len = socket.recv(&mut buffer).await?;
    buffer.truncate(len);
    Ok(buffer)
}

fn body(payload: &[u8]) -> Result<String, QueryError> {
    let rest = payload
        .strip_prefix(&QUERY_PREFIX)
        .ok_or_else(|| QueryError::ParseFailure("missing connectionless header".to_string()))?;
    Ok(String::from_utf8_lossy(rest).into_owned())
}

fn captures(pattern: &Regex, text: &str) -> Vec<String> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extracts the quoted name from every `<int>{n} "<name>"` status line.
pub fn parse_status(payload: &[u8], numeric_fields: usize) -> Result<Vec<String>, QueryError> {
    let text = body(payload)?;
    let names = match numeric_fields {
        4 => captures(&STATUS_FOUR_FIELDS, &text),
        2 => captures(&STATUS_TWO_FIELDS, &text),
        n => captures(&status_line_pattern(n), &text),
    };
    Ok(names)
}

/// Extracts every double-quoted token from a `getstatus` reply.
pub fn parse_structured(payload: &[u8]) -> Result<Vec<String>, QueryError> {
    let text = body(payload)?;
    Ok(captures(&QUOTED_TOKEN, &text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(text: &str) -> Vec<u8> {
        let mut payload = QUERY_PREFIX.to_vec();
        payload.extend_from_slice(text.as_bytes());
        payload
    }

    #[test]
    fn test_parse_quakeworld_status() {
        let payload = reply(
            "n\\maxclients\\16\\map\\dm4\n\
             12 7 31 48 \"^1Player[CLAN]^7\" \"base\" 4 4\n\
             13 -2 10 120 \"Bob\" \"base\" 0 0\n",
        );

        let names = parse_status(&payload, 4).unwrap();
        assert_eq!(names, vec!["^1Player[CLAN]^7", "Bob"]);
    }

    #[test]
    fn test_parse_quake2_status() {
        let payload = reply("print\n\\hostname\\Q2 Box\\maxclients\\8\n5 33 \"Ranger\"\n0 999 \"(bot) Grunt\"\n");
        let names = parse_status(&payload, 2).unwrap();
        assert_eq!(names, vec!["Ranger", "(bot) Grunt"]);
    }

    #[test]
    fn test_four_field_pattern_ignores_skin_token() {
        // The second quoted token on a QuakeWorld line is the skin, not a player.
        let payload = reply("n\\x\\y\n1 2 3 4 \"Alpha\" \"skin\" 5 6\n");
        assert_eq!(parse_status(&payload, 4).unwrap(), vec!["Alpha"]);
    }

    #[test]
    fn test_parse_status_without_players() {
        let payload = reply("n\\maxclients\\16\\map\\e1m1\n");
        assert!(parse_status(&payload, 4).unwrap().is_empty());
    }

    #[test]
    fn test_parse_status_other_field_count() {
        let payload = reply("x\n1 2 3 \"Three\"\n");
        assert_eq!(parse_status(&payload, 3).unwrap(), vec!["Three"]);
    }

    #[test]
    fn test_parse_structured_status() {
        let payload = reply(
            "statusResponse\n\\sv_hostname\\Arena\\g_gametype\\0\n\
             20 45 \"^1Red^7Baron\"\n\
             3 80 \"^4Blue\"\n",
        );

        let names = parse_structured(&payload).unwrap();
        assert_eq!(names, vec!["^1Red^7Baron", "^4Blue"]);
    }

    #[test]
    fn test_quoted_tokens_do_not_span_lines() {
        let payload = reply("statusResponse\n0 0 \"unterminated\n1 1 \"Solid\"\n");
        assert_eq!(parse_structured(&payload).unwrap(), vec!["Solid"]);
    }

    #[test]
    fn test_missing_header_is_parse_failure() {
        let payload = b"statusResponse\n1 1 \"x\"\n";
        assert!(matches!(
            parse_structured(payload),
            Err(QueryError::ParseFailure(_))
        ));
        assert!(matches!(
            parse_status(b"", 4),
            Err(QueryError::ParseFailure(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let mut payload = QUERY_PREFIX.to_vec();
        payload.extend_from_slice(b"n\n1 2 3 4 \"Na\xFFme\"\n");
        let names = parse_status(&payload, 4).unwrap();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("Na"));
        assert_eq!(shared::sanitize(&names[0]), "Name");
    }

    #[tokio::test]
    async fn test_exchange_sends_prefixed_command() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let request = buf[..len].to_vec();
            server
                .send_to(&reply("n\n1 2 3 4 \"Echo\"\n"), peer)
                .await
                .unwrap();
            request
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(server_addr).await.unwrap();
        let payload = exchange(&client, shared::LEGACY_STATUS_COMMAND).await.unwrap();

        let request = responder.await.unwrap();
        assert_eq!(request, b"\xFF\xFF\xFF\xFFstatus\0".to_vec());
        assert_eq!(parse_status(&payload, 4).unwrap(), vec!["Echo"]);
    }
}
