pub mod truck_controller;
