#![forbid(unsafe_code)]

//! Namespace URIs plus the element and attribute names the engines look for.

pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const DSIG11: &str = "http://www.w3.org/2009/xmldsig11#";
pub const ENC: &str = "http://www.w3.org/2001/04/xmlenc#";
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// Prefix the template builders bind [`ENC`] to when none is given.
pub const ENC_PREFIX: &str = "xenc";
pub const EXC_C14N_PREFIX: &str = "ec";

/// `Type` values of an `<EncryptedData>`.
pub const ENC_TYPE_ELEMENT: &str = "http://www.w3.org/2001/04/xmlenc#Element";
pub const ENC_TYPE_CONTENT: &str = "http://www.w3.org/2001/04/xmlenc#Content";

/// Local names of elements.
pub mod node {
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

    pub const KEY_INFO: &str = "KeyInfo";
    pub const KEY_NAME: &str = "KeyName";
    pub const KEY_VALUE: &str = "KeyValue";
    pub const RSA_KEY_VALUE: &str = "RSAKeyValue";
    pub const RSA_MODULUS: &str = "Modulus";
    pub const RSA_EXPONENT: &str = "Exponent";
    pub const EC_KEY_VALUE: &str = "ECKeyValue";
    pub const NAMED_CURVE: &str = "NamedCurve";
    pub const PUBLIC_KEY: &str = "PublicKey";

    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";
    pub const X509_CRL: &str = "X509CRL";
    pub const X509_SUBJECT_NAME: &str = "X509SubjectName";
    pub const X509_ISSUER_SERIAL: &str = "X509IssuerSerial";
    pub const X509_ISSUER_NAME: &str = "X509IssuerName";
    pub const X509_SERIAL_NUMBER: &str = "X509SerialNumber";
    pub const X509_SKI: &str = "X509SKI";

    pub const ENCRYPTED_DATA: &str = "EncryptedData";
    pub const ENCRYPTED_KEY: &str = "EncryptedKey";
    pub const ENCRYPTION_METHOD: &str = "EncryptionMethod";
    pub const CIPHER_DATA: &str = "CipherData";
    pub const CIPHER_VALUE: &str = "CipherValue";
    pub const CIPHER_REFERENCE: &str = "CipherReference";
}

/// Attribute names.
pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const MIME_TYPE: &str = "MimeType";
    pub const ENCODING: &str = "Encoding";
    pub const ALGORITHM: &str = "Algorithm";
    pub const RECIPIENT: &str = "Recipient";
    pub const PREFIX_LIST: &str = "PrefixList";
}
