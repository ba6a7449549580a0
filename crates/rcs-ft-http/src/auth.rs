// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Digest authentication for the upload server.
//!
//! Reads the `WWW-Authenticate` challenge from the phase-1 401 response and
//! derives the `Authorization` header for the phase-2 POST. Supports MD5 and
//! SHA-256 digests with optional `qop=auth`.

use rand::{distributions::Alphanumeric, thread_rng, Rng};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;

use crate::UploadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    fn hash(self, data: &str) -> String {
        match self {
            DigestAlgorithm::Md5 => format!("{:x}", md5::compute(data.as_bytes())),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data.as_bytes())),
        }
    }
}

/// Challenge state parsed from WWW-Authenticate.
pub struct HttpAuthenticationAgent {
    username: SmolStr,
    password: SmolStr,
    realm: Option<SmolStr>,
    nonce: Option<SmolStr>,
    qop: Option<SmolStr>,
    opaque: Option<SmolStr>,
    algorithm: DigestAlgorithm,
    nonce_count: u32,
}

impl HttpAuthenticationAgent {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: SmolStr::new(username),
            password: SmolStr::new(password),
            realm: None,
            nonce: None,
            qop: None,
            opaque: None,
            algorithm: DigestAlgorithm::Md5,
            nonce_count: 0,
        }
    }

    /// Reads the digest challenge parameters.
    pub fn read_www_authenticate(&mut self, challenge: &str) -> Result<(), UploadError> {
        self.realm = param(challenge, "realm").map(SmolStr::new);
        self.nonce = param(challenge, "nonce").map(SmolStr::new);
        self.opaque = param(challenge, "opaque").map(SmolStr::new);
        self.qop = param(challenge, "qop")
            .map(|qop| qop.split(',').next().unwrap_or(qop).trim().to_owned())
            .map(SmolStr::new);
        self.algorithm = match param(challenge, "algorithm") {
            Some(alg) if alg.eq_ignore_ascii_case("SHA-256") => DigestAlgorithm::Sha256,
            _ => DigestAlgorithm::Md5,
        };

        if self.realm.is_none() || self.nonce.is_none() {
            return Err(UploadError::AuthFailure(
                "challenge missing realm or nonce".to_owned(),
            ));
        }
        Ok(())
    }

    /// Produces the Authorization header value for a request.
    pub fn authorization_header(
        &mut self,
        method: &str,
        uri: &str,
    ) -> Result<String, UploadError> {
        let (Some(realm), Some(nonce)) = (self.realm.clone(), self.nonce.clone()) else {
            return Err(UploadError::AuthFailure("no challenge read".to_owned()));
        };

        let ha1 = self
            .algorithm
            .hash(&format!("{}:{}:{}", self.username, realm, self.password));
        let ha2 = self.algorithm.hash(&format!("{}:{}", method, uri));

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\"",
            self.username, realm, nonce, uri
        );

        let response = match &self.qop {
            Some(qop) => {
                self.nonce_count += 1;
                let nc = format!("{:08x}", self.nonce_count);
                let cnonce: String = thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(16)
                    .map(char::from)
                    .collect();
                let response = self.algorithm.hash(&format!(
                    "{}:{}:{}:{}:{}:{}",
                    ha1, nonce, nc, cnonce, qop, ha2
                ));
                header.push_str(&format!(
                    ", qop={}, nc={}, cnonce=\"{}\"",
                    qop, nc, cnonce
                ));
                response
            }
            None => self.algorithm.hash(&format!("{}:{}:{}", ha1, nonce, ha2)),
        };
        header.push_str(&format!(", response=\"{}\"", response));
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{}\"", opaque));
        }
        if self.algorithm == DigestAlgorithm::Sha256 {
            header.push_str(", algorithm=SHA-256");
        }
        Ok(header)
    }
}

fn param<'a>(challenge: &'a str, name: &str) -> Option<&'a str> {
    let lower = challenge.to_ascii_lowercase();
    let needle = format!("{}=", name);
    let mut search = 0;
    while let Some(rel) = lower[search..].find(&needle) {
        let pos = search + rel;
        // Reject prefix matches such as "cnonce=" when looking for "nonce="
        let boundary_ok = pos == 0
            || matches!(
                lower.as_bytes()[pos - 1],
                b' ' | b',' | b'\t'
            );
        if boundary_ok {
            let value = challenge[pos + needle.len()..].trim_start();
            if let Some(stripped) = value.strip_prefix('"') {
                let end = stripped.find('"')?;
                return Some(&stripped[..end]);
            }
            return value.split([',', ' ']).next().map(str::trim);
        }
        search = pos + needle.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: &str =
        "Digest realm=\"ftcontentserver.rcs\", nonce=\"n0nc3\", qop=\"auth\", opaque=\"0af32\"";

    #[test]
    fn parses_challenge_parameters() {
        let mut agent = HttpAuthenticationAgent::new("alice", "secret");
        agent.read_www_authenticate(CHALLENGE).unwrap();

        let header = agent.authorization_header("POST", "/upload").unwrap();
        assert!(header.starts_with("Digest username=\"alice\""));
        assert!(header.contains("realm=\"ftcontentserver.rcs\""));
        assert!(header.contains("nonce=\"n0nc3\""));
        assert!(header.contains("qop=auth"));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains("opaque=\"0af32\""));
    }

    #[test]
    fn nonce_count_increments_per_request() {
        let mut agent = HttpAuthenticationAgent::new("alice", "secret");
        agent.read_www_authenticate(CHALLENGE).unwrap();
        let _ = agent.authorization_header("POST", "/upload").unwrap();
        let second = agent.authorization_header("POST", "/upload").unwrap();
        assert!(second.contains("nc=00000002"));
    }

    #[test]
    fn rejects_challenge_without_nonce() {
        let mut agent = HttpAuthenticationAgent::new("alice", "secret");
        let result = agent.read_www_authenticate("Digest realm=\"x\"");
        assert!(matches!(result, Err(UploadError::AuthFailure(_))));
    }

    #[test]
    fn nonce_lookup_ignores_cnonce() {
        let mut agent = HttpAuthenticationAgent::new("alice", "secret");
        agent
            .read_www_authenticate("Digest cnonce=\"bad\", realm=\"r\", nonce=\"good\"")
            .unwrap();
        let header = agent.authorization_header("POST", "/u").unwrap();
        assert!(header.contains("nonce=\"good\""));
    }

    #[test]
    fn sha256_algorithm_is_honored() {
        let mut agent = HttpAuthenticationAgent::new("alice", "secret");
        agent
            .read_www_authenticate("Digest realm=\"r\", nonce=\"n\", algorithm=SHA-256")
            .unwrap();
        let header = agent.authorization_header("POST", "/u").unwrap();
        assert!(header.contains("algorithm=SHA-256"));
    }

    #[test]
    fn digest_without_qop_uses_legacy_formula() {
        let mut agent = HttpAuthenticationAgent::new("alice", "secret");
        agent
            .read_www_authenticate("Digest realm=\"r\", nonce=\"n\"")
            .unwrap();
        let header = agent.authorization_header("POST", "/u").unwrap();
        // RFC 2069 form: H(H(user:realm:pass):nonce:H(method:uri))
        let ha1 = format!("{:x}", md5::compute("alice:r:secret".as_bytes()));
        let ha2 = format!("{:x}", md5::compute("POST:/u".as_bytes()));
        let expected = format!(
            "{:x}",
            md5::compute(format!("{}:n:{}", ha1, ha2).as_bytes())
        );
        assert!(header.contains(&format!("response=\"{}\"", expected)));
        assert!(!header.contains("nc="));
    }
}
