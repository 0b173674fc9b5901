//! Catch-all DNS responder.
//!
//! Every question, whatever its name or record type, is answered with a
//! single A record pointing at the service address. There is no zone data
//! and nothing is ever forwarded upstream.

use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Largest datagram accepted without EDNS.
const MAX_QUERY_SIZE: usize = 512;

/// Builds the wire-format response to `query`.
///
/// The response echoes the id, questions, opcode and recursion-desired flag.
/// A standard query is answered authoritatively; any other opcode gets an
/// empty NOTIMP response.
///
/// # Errors
///
/// Returns [`Error::Dns`] if `query` cannot be decoded or the response
/// cannot be encoded, and [`Error::UnexpectedDns`] if `query` is itself a
/// response. Responses are never answered.
pub fn answer(query: &[u8], service_ip: Ipv4Addr, ttl: u32) -> Result<Vec<u8>> {
    let request = Message::from_vec(query)?;

    if request.message_type() == MessageType::Response {
        return Err(Error::UnexpectedDns(format!(
            "message {} is a response",
            request.id()
        )));
    }

    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .add_queries(request.queries().iter().cloned());

    if request.op_code() != OpCode::Query {
        debug!("Opcode {:?} not implemented", request.op_code());
        response.set_response_code(ResponseCode::NotImp);
        return Ok(response.to_vec()?);
    }

    response.set_authoritative(true);
    for question in request.queries() {
        debug!(
            "{} {} -> {}",
            question.query_type(),
            question.name(),
            service_ip
        );
        response.add_answer(Record::from_rdata(
            question.name().clone(),
            ttl,
            RData::A(A(service_ip)),
        ));
    }

    Ok(response.to_vec()?)
}

pub struct DnsServer {
    socket: Arc<UdpSocket>,
    service_ip: Ipv4Addr,
    ttl: u32,
}

impl DnsServer {
    pub fn new(socket: UdpSocket, service_ip: Ipv4Addr, ttl: u32) -> Self {
        Self {
            socket: Arc::new(socket),
            service_ip,
            ttl,
        }
    }

    /// Answers queries until `shutdown` resolves. Undecodable datagrams,
    /// incoming responses and failed sends are logged and skipped.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut buffer = [0u8; MAX_QUERY_SIZE];
        tokio::pin!(shutdown);

        if let Ok(local) = self.socket.local_addr() {
            info!("DNS server listening on {} (answering {})", local, self.service_ip);
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                received = self.socket.recv_from(&mut buffer) => {
                    let (size, source) = match received {
                        Ok(received) => received,
                        Err(error) => {
                            warn!("DNS receive error: {}", error);
                            continue;
                        }
                    };

                    let response = match answer(&buffer[..size], self.service_ip, self.ttl) {
                        Ok(response) => response,
                        Err(error) => {
                            warn!("Dropping DNS query from {}: {}", source, error);
                            continue;
                        }
                    };

                    if let Err(error) = self.socket.send_to(&response, source).await {
                        warn!("Failed to send DNS response to {}: {}", source, error);
                    }
                }
            }
        }

        info!("DNS server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::Query;
    use hickory_proto::rr::{DNSClass, Name, RecordType};

    const SERVICE_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    fn message(
        message_type: MessageType,
        op_code: OpCode,
        name: &str,
        record_type: RecordType,
    ) -> Vec<u8> {
        let mut message = Message::new();
        message
            .set_id(0x4242)
            .set_message_type(message_type)
            .set_op_code(op_code)
            .set_recursion_desired(true)
            .add_query(Query::query(Name::from_ascii(name).unwrap(), record_type));
        message.to_vec().unwrap()
    }

    fn query(name: &str, record_type: RecordType) -> Vec<u8> {
        message(MessageType::Query, OpCode::Query, name, record_type)
    }

    fn single_a_record(response: &Message) -> (Ipv4Addr, u32) {
        assert_eq!(response.answers().len(), 1);
        let record = &response.answers()[0];
        assert_eq!(record.record_type(), RecordType::A);
        assert_eq!(record.dns_class(), DNSClass::IN);
        match record.data() {
            Some(RData::A(address)) => (address.0, record.ttl()),
            other => panic!("unexpected record data: {:?}", other),
        }
    }

    #[test]
    fn test_a_query_gets_service_address() {
        let bytes = answer(&query("phone.example.com.", RecordType::A), SERVICE_IP, 60).unwrap();
        let response = Message::from_vec(&bytes).unwrap();

        assert_eq!(response.id(), 0x4242);
        assert_eq!(response.message_type(), MessageType::Response);
        assert!(response.authoritative());
        assert!(response.recursion_desired());
        assert_eq!(response.queries().len(), 1);
        assert_eq!(
            response.answers()[0].name(),
            &Name::from_ascii("phone.example.com.").unwrap()
        );
        assert_eq!(single_a_record(&response), (SERVICE_IP, 60));
    }

    #[test]
    fn test_every_record_type_gets_an_a_record() {
        for record_type in [RecordType::AAAA, RecordType::MX, RecordType::TXT, RecordType::SRV] {
            let bytes = answer(&query("anything.lan.", record_type), SERVICE_IP, 60).unwrap();
            let response = Message::from_vec(&bytes).unwrap();

            assert_eq!(single_a_record(&response), (SERVICE_IP, 60));
        }
    }

    #[test]
    fn test_ttl_follows_argument() {
        let bytes = answer(&query("example.org.", RecordType::A), SERVICE_IP, 5).unwrap();
        let response = Message::from_vec(&bytes).unwrap();
        assert_eq!(single_a_record(&response).1, 5);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = answer(&[0x12, 0x34, 0x01], SERVICE_IP, 60);
        assert!(matches!(result, Err(Error::Dns(_))));
    }

    #[test]
    fn test_responses_are_never_answered() {
        let incoming = message(
            MessageType::Response,
            OpCode::Query,
            "phone.example.com.",
            RecordType::A,
        );

        let result = answer(&incoming, SERVICE_IP, 60);
        assert!(matches!(result, Err(Error::UnexpectedDns(_))));
    }

    #[test]
    fn test_other_opcodes_get_notimp() {
        for op_code in [OpCode::Status, OpCode::Notify, OpCode::Update] {
            let incoming = message(MessageType::Query, op_code, "phone.local.", RecordType::A);

            let bytes = answer(&incoming, SERVICE_IP, 60).unwrap();
            let response = Message::from_vec(&bytes).unwrap();

            assert_eq!(response.id(), 0x4242);
            assert_eq!(response.message_type(), MessageType::Response);
            assert_eq!(response.op_code(), op_code);
            assert_eq!(response.response_code(), ResponseCode::NotImp);
            assert!(!response.authoritative());
            assert!(response.answers().is_empty());
        }
    }

    #[tokio::test]
    async fn test_udp_round_trip() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server_socket.local_addr().unwrap();
        let server = DnsServer::new(server_socket, SERVICE_IP, 60);

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let run = server.run(async move {
            let _ = stop_rx.await;
        });

        let exchange = async move {
            // garbage first: the server must keep going
            client.send_to(&[0xff; 3], server_addr).await.unwrap();
            client
                .send_to(&query("provision.local.", RecordType::A), server_addr)
                .await
                .unwrap();

            let mut buffer = [0u8; 512];
            let (size, _) = tokio::time::timeout(
                std::time::Duration::from_secs(5),
                client.recv_from(&mut buffer),
            )
            .await
            .unwrap()
            .unwrap();

            let _ = stop_tx.send(());
            Message::from_vec(&buffer[..size]).unwrap()
        };

        let (result, response) = tokio::join!(run, exchange);
        assert!(result.is_ok());
        assert_eq!(single_a_record(&response), (SERVICE_IP, 60));
    }
}
