//! Describe-then-create of the shared network.
//!
//! All kgrid clusters in an account and region live in one VPC. Every
//! resource is found by the [`MANAGED_TAG`] tag key (subnets additionally by
//! `kgrid/private` / `kgrid/public`, route tables by `kgrid/subnet-id`) and
//! created only when absent, so concurrent workers converge on the same
//! network.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::MANAGED_TAG;
use crate::api::{AwsContext, NetworkConfig};
use crate::cli::{AwsCli, strings};
use crate::error::{EksError, EksResult};

pub const VPC_CIDR: &str = "172.24.0.0/16";
pub const PRIVATE_SUBNET_CIDRS: [&str; 2] = ["172.24.100.0/24", "172.24.101.0/24"];
pub const PUBLIC_SUBNET_CIDR: &str = "172.24.102.0/24";

const PRIVATE_TAG: &str = "kgrid/private";
const PUBLIC_TAG: &str = "kgrid/public";
const SUBNET_ID_TAG: &str = "kgrid/subnet-id";

pub const ROLE_NAME: &str = "kgrid-eks";
pub const ROLE_PATH: &str = "/kgrid/";

/// Managed policies attached to the cluster/node role.
pub const ROLE_POLICIES: [&str; 5] = [
    "arn:aws:iam::aws:policy/AmazonEKSClusterPolicy",
    "arn:aws:iam::aws:policy/AmazonEKSServicePolicy",
    "arn:aws:iam::aws:policy/AmazonEKSWorkerNodePolicy",
    "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryReadOnly",
    "arn:aws:iam::aws:policy/AmazonEKS_CNI_Policy",
];

// ── EC2 / IAM responses ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Vpc {
    vpc_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeVpcs {
    #[serde(default)]
    vpcs: Vec<Vpc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateVpc {
    vpc: Vpc,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InternetGateway {
    internet_gateway_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInternetGateways {
    #[serde(default)]
    internet_gateways: Vec<InternetGateway>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateInternetGateway {
    internet_gateway: InternetGateway,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroup {
    group_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroups {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Subnet {
    subnet_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSubnets {
    #[serde(default)]
    subnets: Vec<Subnet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateSubnet {
    subnet: Subnet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RouteTable {
    route_table_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeRouteTables {
    #[serde(default)]
    route_tables: Vec<RouteTable>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateRouteTable {
    route_table: RouteTable,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Address {
    allocation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeAddresses {
    #[serde(default)]
    addresses: Vec<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NatGateway {
    nat_gateway_id: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeNatGateways {
    #[serde(default)]
    nat_gateways: Vec<NatGateway>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateNatGateway {
    nat_gateway: NatGateway,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Role {
    arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListRoles {
    #[serde(default)]
    roles: Vec<Role>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateRole {
    role: Role,
}

// ── Argument helpers ───────────────────────────────────────────────

/// `--filters` value selecting resources carrying a tag key.
pub fn tag_key_filter(key: &str) -> String {
    format!("Name=tag-key,Values={key}")
}

/// `--tag-specifications` value with the managed tag plus `extra` key/value pairs.
pub fn tag_specification(resource_type: &str, extra: &[(&str, &str)]) -> String {
    let mut tags = vec![format!("{{Key={MANAGED_TAG},Value=1}}")];
    tags.extend(
        extra
            .iter()
            .map(|(key, value)| format!("{{Key={key},Value={value}}}")),
    );
    format!("ResourceType={resource_type},Tags=[{}]", tags.join(","))
}

/// Availability zones used for the two private subnets.
pub fn availability_zones(region: &str) -> [String; 2] {
    [format!("{region}a"), format!("{region}b")]
}

/// Trust policy letting both EKS and EC2 assume the role.
pub fn assume_role_policy() -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": "eks.amazonaws.com" },
                "Action": "sts:AssumeRole",
            },
            {
                "Effect": "Allow",
                "Principal": { "Service": "ec2.amazonaws.com" },
                "Action": "sts:AssumeRole",
            },
        ],
    })
    .to_string()
}

fn tolerate(result: EksResult<()>, codes: &[&str]) -> EksResult<()> {
    match result {
        Err(e) if e.code().is_some_and(|code| codes.contains(&code)) => {
            debug!(error = %e, "ignoring benign aws error");
            Ok(())
        }
        other => other,
    }
}

impl AwsCli {
    pub(crate) async fn ensure_vpc(&self, ctx: &AwsContext) -> EksResult<NetworkConfig> {
        let mut network = NetworkConfig::default();

        let found: DescribeVpcs = self
            .call(ctx, "ec2", "describe-vpcs", &[
                "--filters".to_string(),
                tag_key_filter(MANAGED_TAG),
            ])
            .await?;
        network.vpc_id = match found.vpcs.into_iter().next() {
            Some(vpc) => vpc.vpc_id,
            None => {
                let created: CreateVpc = self
                    .call(ctx, "ec2", "create-vpc", &[
                        "--cidr-block".to_string(),
                        VPC_CIDR.to_string(),
                        "--tag-specifications".to_string(),
                        tag_specification("vpc", &[]),
                    ])
                    .await?;
                info!(vpc = %created.vpc.vpc_id, region = %ctx.region, "created vpc");
                created.vpc.vpc_id
            }
        };

        network.internet_gateway_id = self.ensure_internet_gateway(ctx, &network.vpc_id).await?;
        network.security_group_ids = vec![self.ensure_security_group(ctx, &network.vpc_id).await?];
        network.private_subnet_ids = self.ensure_private_subnets(ctx, &network.vpc_id).await?;
        network.public_subnet_id = self.ensure_public_subnet(ctx, &network.vpc_id).await?;

        let public_table = self
            .ensure_route_table(ctx, &network.vpc_id, &network.public_subnet_id)
            .await?;
        tolerate(
            self.call_unit(ctx, "ec2", "create-route", &strings([
                "--route-table-id",
                public_table.as_str(),
                "--destination-cidr-block",
                "0.0.0.0/0",
                "--gateway-id",
                network.internet_gateway_id.as_str(),
            ]))
            .await,
            &["RouteAlreadyExists"],
        )?;

        network.eip_allocation_id = self.ensure_elastic_ip(ctx).await?;
        network.nat_gateway_id = self
            .ensure_nat_gateway(ctx, &network.public_subnet_id, &network.eip_allocation_id)
            .await?;

        for subnet in &network.private_subnet_ids {
            let table = self.ensure_route_table(ctx, &network.vpc_id, subnet).await?;
            tolerate(
                self.call_unit(ctx, "ec2", "create-route", &strings([
                    "--route-table-id",
                    table.as_str(),
                    "--destination-cidr-block",
                    "0.0.0.0/0",
                    "--nat-gateway-id",
                    network.nat_gateway_id.as_str(),
                ]))
                .await,
                &["RouteAlreadyExists"],
            )?;
        }

        network.role_arn = self.ensure_role(ctx).await?;

        debug!(vpc = %network.vpc_id, region = %ctx.region, "network ready");
        Ok(network)
    }

    async fn ensure_internet_gateway(&self, ctx: &AwsContext, vpc_id: &str) -> EksResult<String> {
        let found: DescribeInternetGateways = self
            .call(ctx, "ec2", "describe-internet-gateways", &[
                "--filters".to_string(),
                tag_key_filter(MANAGED_TAG),
            ])
            .await?;
        if let Some(igw) = found.internet_gateways.into_iter().next() {
            return Ok(igw.internet_gateway_id);
        }

        let created: CreateInternetGateway = self
            .call(ctx, "ec2", "create-internet-gateway", &[
                "--tag-specifications".to_string(),
                tag_specification("internet-gateway", &[]),
            ])
            .await?;
        let id = created.internet_gateway.internet_gateway_id;
        self.call_unit(ctx, "ec2", "attach-internet-gateway", &strings([
            "--internet-gateway-id",
            id.as_str(),
            "--vpc-id",
            vpc_id,
        ]))
        .await?;
        info!(internet_gateway = %id, vpc = %vpc_id, "created internet gateway");
        Ok(id)
    }

    async fn ensure_security_group(&self, ctx: &AwsContext, vpc_id: &str) -> EksResult<String> {
        let found: DescribeSecurityGroups = self
            .call(ctx, "ec2", "describe-security-groups", &[
                "--filters".to_string(),
                tag_key_filter(MANAGED_TAG),
            ])
            .await?;
        if let Some(group) = found.security_groups.into_iter().next() {
            return Ok(group.group_id);
        }

        let created: SecurityGroup = self
            .call(ctx, "ec2", "create-security-group", &[
                "--group-name".to_string(),
                "kgrid-default".to_string(),
                "--description".to_string(),
                "kgrid".to_string(),
                "--vpc-id".to_string(),
                vpc_id.to_string(),
                "--tag-specifications".to_string(),
                tag_specification("security-group", &[]),
            ])
            .await?;
        info!(security_group = %created.group_id, "created security group");
        Ok(created.group_id)
    }

    async fn ensure_private_subnets(&self, ctx: &AwsContext, vpc_id: &str) -> EksResult<Vec<String>> {
        let found: DescribeSubnets = self
            .call(ctx, "ec2", "describe-subnets", &[
                "--filters".to_string(),
                tag_key_filter(PRIVATE_TAG),
            ])
            .await?;
        if !found.subnets.is_empty() {
            return Ok(found.subnets.into_iter().map(|s| s.subnet_id).collect());
        }

        let zones = availability_zones(&ctx.region);
        let mut ids = Vec::with_capacity(PRIVATE_SUBNET_CIDRS.len());
        for (cidr, zone) in PRIVATE_SUBNET_CIDRS.iter().zip(zones.iter()) {
            ids.push(self.create_subnet(ctx, vpc_id, cidr, zone, PRIVATE_TAG).await?);
        }
        Ok(ids)
    }

    async fn ensure_public_subnet(&self, ctx: &AwsContext, vpc_id: &str) -> EksResult<String> {
        let found: DescribeSubnets = self
            .call(ctx, "ec2", "describe-subnets", &[
                "--filters".to_string(),
                tag_key_filter(PUBLIC_TAG),
            ])
            .await?;
        if let Some(subnet) = found.subnets.into_iter().next() {
            return Ok(subnet.subnet_id);
        }

        let zones = availability_zones(&ctx.region);
        self.create_subnet(ctx, vpc_id, PUBLIC_SUBNET_CIDR, &zones[0], PUBLIC_TAG)
            .await
    }

    async fn create_subnet(
        &self,
        ctx: &AwsContext,
        vpc_id: &str,
        cidr: &str,
        zone: &str,
        role_tag: &str,
    ) -> EksResult<String> {
        let created: CreateSubnet = self
            .call(ctx, "ec2", "create-subnet", &[
                "--vpc-id".to_string(),
                vpc_id.to_string(),
                "--cidr-block".to_string(),
                cidr.to_string(),
                "--availability-zone".to_string(),
                zone.to_string(),
                "--tag-specifications".to_string(),
                tag_specification("subnet", &[(role_tag, "1")]),
            ])
            .await?;
        info!(subnet = %created.subnet.subnet_id, %cidr, %zone, "created subnet");
        Ok(created.subnet.subnet_id)
    }

    /// Find or create the route table tagged for `subnet_id` and associate it.
    async fn ensure_route_table(
        &self,
        ctx: &AwsContext,
        vpc_id: &str,
        subnet_id: &str,
    ) -> EksResult<String> {
        let found: DescribeRouteTables = self
            .call(ctx, "ec2", "describe-route-tables", &[
                "--filters".to_string(),
                format!("Name=tag:{SUBNET_ID_TAG},Values={subnet_id}"),
            ])
            .await?;
        let table = match found.route_tables.into_iter().next() {
            Some(table) => table.route_table_id,
            None => {
                let created: CreateRouteTable = self
                    .call(ctx, "ec2", "create-route-table", &[
                        "--vpc-id".to_string(),
                        vpc_id.to_string(),
                        "--tag-specifications".to_string(),
                        tag_specification("route-table", &[(SUBNET_ID_TAG, subnet_id)]),
                    ])
                    .await?;
                created.route_table.route_table_id
            }
        };

        tolerate(
            self.call_unit(ctx, "ec2", "associate-route-table", &strings([
                "--route-table-id",
                table.as_str(),
                "--subnet-id",
                subnet_id,
            ]))
            .await,
            &["Resource.AlreadyAssociated"],
        )?;
        Ok(table)
    }

    async fn ensure_elastic_ip(&self, ctx: &AwsContext) -> EksResult<String> {
        let found: DescribeAddresses = self
            .call(ctx, "ec2", "describe-addresses", &[
                "--filters".to_string(),
                tag_key_filter(MANAGED_TAG),
            ])
            .await?;
        // An existing address may already be associated, but only with our NAT gateway.
        if let Some(address) = found.addresses.into_iter().next() {
            return Ok(address.allocation_id);
        }

        let created: Address = self
            .call(ctx, "ec2", "allocate-address", &[
                "--domain".to_string(),
                "vpc".to_string(),
                "--tag-specifications".to_string(),
                tag_specification("elastic-ip", &[]),
            ])
            .await?;
        info!(allocation = %created.allocation_id, "allocated elastic ip");
        Ok(created.allocation_id)
    }

    async fn ensure_nat_gateway(
        &self,
        ctx: &AwsContext,
        subnet_id: &str,
        allocation_id: &str,
    ) -> EksResult<String> {
        let found: DescribeNatGateways = self
            .call(ctx, "ec2", "describe-nat-gateways", &[
                "--filter".to_string(),
                tag_key_filter(MANAGED_TAG),
            ])
            .await?;
        if let Some(gw) = found
            .nat_gateways
            .into_iter()
            .find(|gw| gw.state == "pending" || gw.state == "available")
        {
            return Ok(gw.nat_gateway_id);
        }

        let created: CreateNatGateway = self
            .call(ctx, "ec2", "create-nat-gateway", &[
                "--subnet-id".to_string(),
                subnet_id.to_string(),
                "--allocation-id".to_string(),
                allocation_id.to_string(),
                "--tag-specifications".to_string(),
                tag_specification("natgateway", &[]),
            ])
            .await?;
        let id = created.nat_gateway.nat_gateway_id;
        info!(nat_gateway = %id, "created nat gateway, waiting for it to become available");

        for attempt in 1..=self.nat_gateway_attempts {
            let status: DescribeNatGateways = self
                .call(ctx, "ec2", "describe-nat-gateways", &strings([
                    "--nat-gateway-ids",
                    id.as_str(),
                ]))
                .await?;
            if status.nat_gateways.iter().any(|gw| gw.state == "available") {
                return Ok(id);
            }
            debug!(nat_gateway = %id, attempt, "nat gateway not yet available");
            tokio::time::sleep(self.poll).await;
        }

        Err(EksError::TimedOut(format!("nat gateway {id} to become available")))
    }

    async fn ensure_role(&self, ctx: &AwsContext) -> EksResult<String> {
        let found: ListRoles = self
            .call(ctx, "iam", "list-roles", &strings(["--path-prefix", ROLE_PATH]))
            .await?;
        if let Some(role) = found.roles.into_iter().next() {
            return Ok(role.arn);
        }

        let created: CreateRole = self
            .call(ctx, "iam", "create-role", &[
                "--role-name".to_string(),
                ROLE_NAME.to_string(),
                "--path".to_string(),
                ROLE_PATH.to_string(),
                "--assume-role-policy-document".to_string(),
                assume_role_policy(),
            ])
            .await?;
        for policy in ROLE_POLICIES {
            self.call_unit(ctx, "iam", "attach-role-policy", &strings([
                "--role-name",
                ROLE_NAME,
                "--policy-arn",
                policy,
            ]))
            .await?;
        }
        info!(role = %created.role.arn, "created eks role");
        Ok(created.role.arn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_specification_always_carries_marker() {
        assert_eq!(
            tag_specification("vpc", &[]),
            "ResourceType=vpc,Tags=[{Key=kgrid/managed,Value=1}]"
        );
        assert_eq!(
            tag_specification("route-table", &[("kgrid/subnet-id", "subnet-1")]),
            "ResourceType=route-table,Tags=[{Key=kgrid/managed,Value=1},{Key=kgrid/subnet-id,Value=subnet-1}]"
        );
    }

    #[test]
    fn zones_follow_region() {
        assert_eq!(availability_zones("us-west-1"), ["us-west-1a", "us-west-1b"]);
    }

    #[test]
    fn trust_policy_covers_eks_and_ec2() {
        let policy: serde_json::Value = serde_json::from_str(&assume_role_policy()).unwrap();
        let services: Vec<&str> = policy["Statement"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|s| s["Principal"]["Service"].as_str())
            .collect();
        assert_eq!(services, ["eks.amazonaws.com", "ec2.amazonaws.com"]);
    }

    #[test]
    fn tolerates_only_named_codes() {
        let benign = Err(EksError::Api {
            operation: "ec2 create-route".to_string(),
            code: Some("RouteAlreadyExists".to_string()),
            message: "An error occurred (RouteAlreadyExists)".to_string(),
        });
        assert!(tolerate(benign, &["RouteAlreadyExists"]).is_ok());

        let real = Err(EksError::Api {
            operation: "ec2 create-route".to_string(),
            code: Some("UnauthorizedOperation".to_string()),
            message: "UnauthorizedOperation".to_string(),
        });
        assert!(tolerate(real, &["RouteAlreadyExists"]).is_err());
    }

    #[test]
    fn decodes_pascal_case_ec2_responses() {
        let nat: DescribeNatGateways = serde_json::from_str(
            r#"{"NatGateways": [{"NatGatewayId": "nat-1", "State": "pending", "SubnetId": "s"}]}"#,
        )
        .unwrap();
        assert_eq!(nat.nat_gateways[0].nat_gateway_id, "nat-1");

        let empty: DescribeVpcs = serde_json::from_str(r#"{"Vpcs": []}"#).unwrap();
        assert!(empty.vpcs.is_empty());
    }
}
