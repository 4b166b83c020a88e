//! Seed records for the demo dataset.
//!
//! Passwords are stored as SHA-256 hex digests. Demo logins:
//! `admin@utility.demo / admin123`, `supervisor@utility.demo / super123`,
//! `agent@utility.demo / agent123`, `field@utility.demo / field123`.

use serde_json::{json, Value};

pub const DEMO_ADMIN_EMAIL: &str = "admin@utility.demo";
pub const DEMO_ADMIN_PASSWORD: &str = "admin123";

pub fn users() -> Vec<Value> {
  vec![
    json!({
      "id": "USR-1",
      "name": "Amina Okafor",
      "email": "admin@utility.demo",
      "role": "admin",
      "department": "Operations",
      "phone": "+1-555-0100",
      "isActive": true,
      "passwordHash": "240be518fabd2724ddb6f04eeb1da5967448d7e831c08c8fa822809f74c720a9",
      "createdAt": "2024-01-08T09:00:00Z",
      "updatedAt": "2024-01-08T09:00:00Z"
    }),
    json!({
      "id": "USR-2",
      "name": "Daniel Reyes",
      "email": "supervisor@utility.demo",
      "role": "supervisor",
      "department": "Customer Care",
      "phone": "+1-555-0101",
      "isActive": true,
      "passwordHash": "4e4c56e4a15f89f05c2f4c72613da2a18c9665d4f0d6acce16415eb06f9be776",
      "createdAt": "2024-01-09T09:00:00Z",
      "updatedAt": "2024-01-09T09:00:00Z"
    }),
    json!({
      "id": "USR-3",
      "name": "Priya Natarajan",
      "email": "agent@utility.demo",
      "role": "agent",
      "department": "Customer Care",
      "phone": "+1-555-0102",
      "isActive": true,
      "passwordHash": "f44d1ac9bf0c69b083380b86dbdf3b73797150e3cca4820ac399f7917e607647",
      "createdAt": "2024-01-10T09:00:00Z",
      "updatedAt": "2024-01-10T09:00:00Z"
    }),
    json!({
      "id": "USR-4",
      "name": "Tomas Lindqvist",
      "email": "field@utility.demo",
      "role": "technician",
      "department": "Field Service",
      "phone": "+1-555-0103",
      "isActive": true,
      "passwordHash": "da66e96b63b0fa81900f3eeeb289e2814425612d1a77cdb94c188699555800b1",
      "createdAt": "2024-01-11T09:00:00Z",
      "updatedAt": "2024-01-11T09:00:00Z"
    }),
  ]
}

pub fn complaints() -> Vec<Value> {
  vec![
    json!({
      "id": "CMP-1001",
      "title": "No power since storm",
      "description": "Whole street lost power after last night's storm.",
      "category": "outage",
      "priority": "critical",
      "status": "in_progress",
      "customerName": "Helen Park",
      "customerEmail": "helen.park@example.com",
      "customerPhone": "+1-555-0142",
      "address": "14 Birch Lane",
      "assignedTo": "USR-4",
      "createdBy": "USR-3",
      "createdAt": "2024-03-02T07:15:00Z",
      "updatedAt": "2024-03-02T08:40:00Z"
    }),
    json!({
      "id": "CMP-1002",
      "title": "Bill higher than usual",
      "description": "February bill doubled with no change in usage.",
      "category": "billing",
      "priority": "medium",
      "status": "open",
      "customerName": "Marcus Bell",
      "customerEmail": "m.bell@example.com",
      "customerPhone": "+1-555-0177",
      "address": "220 Harbor Road, Apt 5",
      "assignedTo": null,
      "createdBy": "USR-3",
      "createdAt": "2024-03-03T10:02:00Z",
      "updatedAt": "2024-03-03T10:02:00Z"
    }),
    json!({
      "id": "CMP-1003",
      "title": "Flickering street light",
      "description": "Light outside the school flickers every evening.",
      "category": "maintenance",
      "priority": "low",
      "status": "open",
      "customerName": "Grace Ndlovu",
      "customerEmail": "grace.n@example.com",
      "customerPhone": "+1-555-0119",
      "address": "Corner of Elm and 3rd",
      "assignedTo": "USR-4",
      "createdBy": "USR-2",
      "createdAt": "2024-03-04T16:30:00Z",
      "updatedAt": "2024-03-04T16:30:00Z"
    }),
    json!({
      "id": "CMP-1004",
      "title": "Meter reading disputed",
      "description": "Estimated reading used although meter was accessible.",
      "category": "billing",
      "priority": "high",
      "status": "resolved",
      "customerName": "Oliver Grant",
      "customerEmail": "ogrant@example.com",
      "customerPhone": "+1-555-0163",
      "address": "9 Quarry Street",
      "assignedTo": "USR-3",
      "createdBy": "USR-3",
      "createdAt": "2024-02-26T11:45:00Z",
      "updatedAt": "2024-02-29T14:10:00Z"
    }),
    json!({
      "id": "CMP-1005",
      "title": "Exposed cable near playground",
      "description": "Cable cover damaged next to the park entrance.",
      "category": "safety",
      "priority": "critical",
      "status": "open",
      "customerName": "Leila Haddad",
      "customerEmail": "leila.h@example.com",
      "customerPhone": "+1-555-0188",
      "address": "Riverside Park, north gate",
      "assignedTo": "USR-4",
      "createdBy": "USR-2",
      "createdAt": "2024-03-05T08:05:00Z",
      "updatedAt": "2024-03-05T08:05:00Z"
    }),
    json!({
      "id": "CMP-1006",
      "title": "Voltage drops in the evening",
      "description": "Appliances reset when neighbours start cooking.",
      "category": "quality",
      "priority": "medium",
      "status": "closed",
      "customerName": "Sven Aalto",
      "customerEmail": "sven.aalto@example.com",
      "customerPhone": "+1-555-0131",
      "address": "77 Mill Road",
      "assignedTo": "USR-4",
      "createdBy": "USR-3",
      "createdAt": "2024-02-18T19:20:00Z",
      "updatedAt": "2024-02-22T09:00:00Z"
    }),
  ]
}

pub fn notifications() -> Vec<Value> {
  vec![
    json!({
      "id": "NTF-1",
      "userId": "USR-4",
      "title": "New assignment",
      "message": "CMP-1005 was assigned to you.",
      "type": "assignment",
      "isRead": false,
      "createdAt": "2024-03-05T08:06:00Z"
    }),
    json!({
      "id": "NTF-2",
      "userId": "USR-1",
      "title": "Critical complaint filed",
      "message": "CMP-1001 reported an outage on Birch Lane.",
      "type": "alert",
      "isRead": true,
      "createdAt": "2024-03-02T07:16:00Z"
    }),
    json!({
      "id": "NTF-3",
      "userId": "USR-3",
      "title": "Complaint resolved",
      "message": "CMP-1004 was marked resolved.",
      "type": "status",
      "isRead": false,
      "createdAt": "2024-02-29T14:11:00Z"
    }),
  ]
}

pub fn outages() -> Vec<Value> {
  vec![
    json!({
      "id": "OUT-1",
      "title": "Storm damage, Birch Lane feeder",
      "description": "Downed line on feeder 12 after storm.",
      "affectedArea": "Birch Lane, Oak Court",
      "status": "active",
      "severity": "major",
      "startTime": "2024-03-01T23:40:00Z",
      "estimatedEnd": "2024-03-02T18:00:00Z",
      "createdAt": "2024-03-02T00:05:00Z",
      "updatedAt": "2024-03-02T08:40:00Z"
    }),
    json!({
      "id": "OUT-2",
      "title": "Planned substation maintenance",
      "description": "Transformer swap at Harbor substation.",
      "affectedArea": "Harbor Road 100-400",
      "status": "scheduled",
      "severity": "minor",
      "startTime": "2024-03-10T01:00:00Z",
      "estimatedEnd": "2024-03-10T05:00:00Z",
      "createdAt": "2024-03-01T12:00:00Z",
      "updatedAt": "2024-03-01T12:00:00Z"
    }),
  ]
}
