use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::cpf;
use crate::errors::AppError;

/// Column limits mirrored from the schema in `db.rs`.
pub const MAX_NOME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MAX_CEP_LEN: usize = 9;
pub const MAX_NUMERO_LEN: usize = 10;
pub const MAX_COMPLEMENTO_LEN: usize = 100;

// ============ Database Models ============

/// A registered user (`usuarios` row).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    /// Generated identifier.
    pub id: i32,
    /// Full name.
    pub nome: String,
    /// CPF, digits only.
    pub cpf: String,
    /// Contact email, unique across users.
    pub email: String,
    /// Date of birth.
    pub data_nascimento: NaiveDate,
    /// Timestamp of creation.
    pub created_at: NaiveDateTime,
    /// Timestamp of last update.
    pub updated_at: NaiveDateTime,
}

/// A postal address owned by a user (`enderecos` row).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Address {
    pub id: i32,
    /// Owning user.
    pub usuario_id: i32,
    /// Postal code (CEP) as submitted.
    pub cep: String,
    /// Street, filled from the postal lookup.
    pub logradouro: Option<String>,
    pub numero: String,
    pub complemento: Option<String>,
    /// Neighborhood.
    pub bairro: Option<String>,
    /// City.
    pub cidade: Option<String>,
    /// Two-letter state code (UF).
    pub estado: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ============ Request Models ============

/// Payload for `POST /api/usuarios`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    #[serde(alias = "name")]
    pub nome: String,
    #[serde(alias = "taxId")]
    pub cpf: String,
    pub email: String,
    #[serde(alias = "birthDate")]
    pub data_nascimento: NaiveDate,
}

impl NewUser {
    /// Checks field limits and normalizes the CPF to its digits.
    pub fn validated(mut self) -> Result<Self, AppError> {
        validate_nome(&self.nome)?;
        validate_email(&self.email)?;
        if !cpf::is_valid_cpf(&self.cpf) {
            return Err(AppError::BadRequest("invalid tax id".to_string()));
        }
        self.cpf = cpf::digits(&self.cpf);
        Ok(self)
    }
}

/// Partial update for `PUT /api/usuarios/:id`.
///
/// Only known columns deserialize; any other key is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserChanges {
    #[serde(default, alias = "name")]
    pub nome: Option<String>,
    #[serde(default, alias = "taxId")]
    pub cpf: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "birthDate")]
    pub data_nascimento: Option<NaiveDate>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.nome.is_none()
            && self.cpf.is_none()
            && self.email.is_none()
            && self.data_nascimento.is_none()
    }

    /// Validates every supplied field and normalizes the CPF.
    pub fn validated(mut self) -> Result<Self, AppError> {
        if let Some(ref nome) = self.nome {
            validate_nome(nome)?;
        }
        if let Some(ref email) = self.email {
            validate_email(email)?;
        }
        if let Some(cpf) = self.cpf.take() {
            if !cpf::is_valid_cpf(&cpf) {
                return Err(AppError::BadRequest("invalid tax id".to_string()));
            }
            self.cpf = Some(cpf::digits(&cpf));
        }
        Ok(self)
    }
}

/// Payload for creating or replacing an address.
///
/// Fields are optional so a missing one yields the dedicated 400 message
/// instead of a deserialization error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressRequest {
    #[serde(default, alias = "postalCode")]
    pub cep: Option<String>,
    #[serde(default, alias = "number")]
    pub numero: Option<String>,
    #[serde(default, alias = "complement")]
    pub complemento: Option<String>,
}

/// Address fields the client supplies, after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInput {
    pub cep: String,
    pub numero: String,
    pub complemento: Option<String>,
}

impl AddressRequest {
    pub fn validated(self) -> Result<AddressInput, AppError> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let (cep, numero) = match (present(self.cep), present(self.numero)) {
            (Some(cep), Some(numero)) => (cep, numero),
            _ => {
                return Err(AppError::BadRequest(
                    "required fields: cep and numero".to_string(),
                ))
            }
        };

        if cep.chars().count() > MAX_CEP_LEN {
            return Err(AppError::BadRequest(format!(
                "cep must be at most {} characters",
                MAX_CEP_LEN
            )));
        }
        if numero.chars().count() > MAX_NUMERO_LEN {
            return Err(AppError::BadRequest(format!(
                "numero must be at most {} characters",
                MAX_NUMERO_LEN
            )));
        }
        if let Some(ref complemento) = self.complemento {
            if complemento.chars().count() > MAX_COMPLEMENTO_LEN {
                return Err(AppError::BadRequest(format!(
                    "complemento must be at most {} characters",
                    MAX_COMPLEMENTO_LEN
                )));
            }
        }

        Ok(AddressInput {
            cep,
            numero,
            complemento: self.complemento,
        })
    }
}

/// Address fields resolved from a postal code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostalAddress {
    pub logradouro: Option<String>,
    pub bairro: Option<String>,
    pub cidade: Option<String>,
    pub estado: Option<String>,
}

/// Everything persisted for an address: client input merged with the lookup.
#[derive(Debug, Clone)]
pub struct NewAddress {
    pub cep: String,
    pub numero: String,
    pub complemento: Option<String>,
    pub logradouro: Option<String>,
    pub bairro: Option<String>,
    pub cidade: Option<String>,
    pub estado: Option<String>,
}

impl NewAddress {
    pub fn merge(input: AddressInput, postal: PostalAddress) -> Self {
        Self {
            cep: input.cep,
            numero: input.numero,
            complemento: input.complemento,
            logradouro: postal.logradouro,
            bairro: postal.bairro,
            cidade: postal.cidade,
            estado: postal.estado,
        }
    }
}

fn validate_nome(nome: &str) -> Result<(), AppError> {
    if nome.trim().is_empty() {
        return Err(AppError::BadRequest("nome cannot be empty".to_string()));
    }
    if nome.chars().count() > MAX_NOME_LEN {
        return Err(AppError::BadRequest(format!(
            "nome must be at most {} characters",
            MAX_NOME_LEN
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() {
        return Err(AppError::BadRequest("email cannot be empty".to_string()));
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(AppError::BadRequest(format!(
            "email must be at most {} characters",
            MAX_EMAIL_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_user_accepts_aliases_and_normalizes_cpf() {
        let user: NewUser = serde_json::from_value(json!({
            "name": "Maria",
            "taxId": "111.444.777-35",
            "email": "maria@example.com",
            "birthDate": "1990-05-17"
        }))
        .unwrap();

        let user = user.validated().unwrap();
        assert_eq!(user.nome, "Maria");
        assert_eq!(user.cpf, "11144477735");
        assert_eq!(
            user.data_nascimento,
            NaiveDate::from_ymd_opt(1990, 5, 17).unwrap()
        );
    }

    #[test]
    fn test_new_user_rejects_long_name() {
        let user = NewUser {
            nome: "x".repeat(101),
            cpf: "11144477735".into(),
            email: "a@b.com".into(),
            data_nascimento: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
        };
        assert!(matches!(user.validated(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_user_changes_reject_unknown_fields() {
        let result = serde_json::from_value::<UserChanges>(json!({"id": 3}));
        assert!(result.is_err());

        let result = serde_json::from_value::<UserChanges>(json!({"senha": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_user_changes_empty_and_null() {
        let changes: UserChanges = serde_json::from_value(json!({})).unwrap();
        assert!(changes.is_empty());

        let changes: UserChanges = serde_json::from_value(json!({"email": null})).unwrap();
        assert!(changes.is_empty());

        let changes: UserChanges =
            serde_json::from_value(json!({"email": "novo@example.com"})).unwrap();
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_user_changes_normalize_cpf() {
        let changes = UserChanges {
            cpf: Some("529.982.247-25".into()),
            ..Default::default()
        };
        assert_eq!(changes.validated().unwrap().cpf.as_deref(), Some("52998224725"));

        let changes = UserChanges {
            cpf: Some("52998224724".into()),
            ..Default::default()
        };
        assert!(changes.validated().is_err());
    }

    #[test]
    fn test_address_request_requires_cep_and_numero() {
        let missing_numero = AddressRequest {
            cep: Some("01001000".into()),
            ..Default::default()
        };
        match missing_numero.validated() {
            Err(AppError::BadRequest(msg)) => assert_eq!(msg, "required fields: cep and numero"),
            other => panic!("unexpected: {:?}", other),
        }

        let blank_cep = AddressRequest {
            cep: Some("  ".into()),
            numero: Some("10".into()),
            complemento: None,
        };
        assert!(blank_cep.validated().is_err());
    }

    #[test]
    fn test_address_request_length_limits() {
        let long_cep = AddressRequest {
            cep: Some("01001-0000".into()),
            numero: Some("10".into()),
            complemento: None,
        };
        assert!(long_cep.validated().is_err());

        let ok = AddressRequest {
            cep: Some("01001-000".into()),
            numero: Some("10".into()),
            complemento: Some("apto 3".into()),
        }
        .validated()
        .unwrap();
        assert_eq!(ok.cep, "01001-000");
        assert_eq!(ok.complemento.as_deref(), Some("apto 3"));
    }

    #[test]
    fn test_merge_takes_lookup_fields() {
        let input = AddressInput {
            cep: "01001000".into(),
            numero: "100".into(),
            complemento: None,
        };
        let postal = PostalAddress {
            logradouro: Some("Praça da Sé".into()),
            bairro: Some("Sé".into()),
            cidade: Some("São Paulo".into()),
            estado: Some("SP".into()),
        };

        let merged = NewAddress::merge(input, postal);
        assert_eq!(merged.cep, "01001000");
        assert_eq!(merged.cidade.as_deref(), Some("São Paulo"));
        assert_eq!(merged.estado.as_deref(), Some("SP"));
    }
}
