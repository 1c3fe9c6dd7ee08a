pub mod truck_dto;
